use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use std::fmt::Write;
use vigil_common::{format_counter, format_gauge, MetricError, MetricKind, WireMetric};
use vigil_storage::{MetricValue, StorageError};

use crate::logging::TraceId;
use crate::state::AppState;

/// Plain-text error reply. The status carries the meaning; the body is for
/// humans.
pub fn error_response(status: StatusCode, trace_id: &str, msg: &str) -> Response {
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, error = %msg, "Request failed");
    } else {
        tracing::debug!(trace_id = %trace_id, error = %msg, "Request rejected");
    }
    (status, msg.to_string()).into_response()
}

/// Handler failure mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<MetricError> for ApiError {
    fn from(e: MetricError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_request(format!("malformed JSON: {e}"))
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let status = match &e {
            StorageError::Metric(_) => StatusCode::BAD_REQUEST,
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

// The request-logging layer records the status and body of this response
// under the request's trace id.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.message, "Handler failed");
        }
        (self.status, self.message).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn to_wire(id: &str, value: MetricValue) -> WireMetric {
    match value {
        MetricValue::Gauge(v) => WireMetric::gauge(id, v),
        MetricValue::Counter(v) => WireMetric::counter(id, v),
    }
}

// ---- Path-encoded updates ----

pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, key, value)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let kind: MetricKind = kind.parse()?;
    state.store.set(kind, &key, &value)?;
    Ok(StatusCode::OK)
}

pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, key)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    Ok(state.store.get(kind, &key)?.to_string())
}

// ---- JSON updates ----

/// Applies one metric and echoes it back with the value now stored: the
/// gauge itself, or the counter's running total in `delta`.
pub async fn update_json(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WireMetric>> {
    let metric: WireMetric = serde_json::from_slice(&body)?;
    let raw = metric.raw_value()?;
    let stored = state.store.set(metric.kind, &metric.id, &raw)?;
    Ok(Json(to_wire(&metric.id, stored)))
}

pub async fn update_batch(State(state): State<AppState>, body: Bytes) -> ApiResult<StatusCode> {
    let metrics: Vec<WireMetric> = serde_json::from_slice(&body)?;
    state.store.set_batch(&metrics)?;
    tracing::debug!(count = metrics.len(), "Applied metric batch");
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct ValueQuery {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

pub async fn value_json(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<WireMetric>> {
    let query: ValueQuery = serde_json::from_slice(&body)?;
    let kind: MetricKind = query.kind.parse()?;
    let value = state.store.get(kind, &query.id)?;
    Ok(Json(to_wire(&query.id, value)))
}

// ---- Service endpoints ----

pub async fn ping(State(state): State<AppState>, Extension(trace_id): Extension<TraceId>) -> Response {
    match state.store.ping() {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            &format!("storage unreachable: {e}"),
        ),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Every stored metric as an HTML list, gauges then counters, each sorted
/// by name.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let table = state.store.get_all();

    let mut html = String::from("<!DOCTYPE html>\n<html><head><title>Metrics</title></head><body>\n");
    html.push_str("<h2>Gauges</h2>\n<ul>\n");
    for (key, value) in &table.gauges {
        let _ = writeln!(html, "<li>{}: {}</li>", escape_html(key), format_gauge(*value));
    }
    html.push_str("</ul>\n<h2>Counters</h2>\n<ul>\n");
    for (key, value) in &table.counters {
        let _ = writeln!(html, "<li>{}: {}</li>", escape_html(key), format_counter(*value));
    }
    html.push_str("</ul>\n</body></html>\n");
    Html(html)
}
