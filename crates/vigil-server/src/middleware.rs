use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use vigil_common::codec::{self, SIGNATURE_HEADER, WRAPPED_KEY_HEADER};

use crate::api::error_response;
use crate::logging::TraceId;
use crate::state::AppState;

/// Largest request body accepted, both on the wire and once inflated.
pub const MAX_PAYLOAD: usize = 8 * 1024 * 1024;

fn trace_id(parts: &Parts) -> String {
    parts
        .extensions
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default()
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Rebuilds the request around a rewritten body.
fn with_body(mut parts: Parts, body: Vec<u8>) -> Request<Body> {
    parts.headers.remove(header::CONTENT_LENGTH);
    Request::from_parts(parts, Body::from(body))
}

async fn read_body(parts: &Parts, body: Body) -> Result<Bytes, Response> {
    axum::body::to_bytes(body, MAX_PAYLOAD).await.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            &trace_id(parts),
            &format!("failed to read body: {e}"),
        )
    })
}

/// Inflates `Content-Encoding: gzip` request bodies. Other requests pass
/// through untouched.
pub async fn inflate_gzip(req: Request<Body>, next: Next) -> Response {
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if !gzipped {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match read_body(&parts, body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let plain = match codec::gunzip_limited(&bytes, MAX_PAYLOAD) {
        Ok(p) => p,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id(&parts),
                &format!("invalid gzip body: {e}"),
            )
        }
    };
    parts.headers.remove(header::CONTENT_ENCODING);
    next.run(with_body(parts, plain)).await
}

/// Opens sealed bodies when the server holds a private key. The wrapped
/// symmetric key travels hex-encoded in the `AES-Key` header.
pub async fn open_sealed(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(key) = state.opening_key.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let trace_id = trace_id(&parts);
    let Some(wrapped_hex) = header_str(&parts, WRAPPED_KEY_HEADER) else {
        tracing::warn!(trace_id = %trace_id, "Request rejected: missing {WRAPPED_KEY_HEADER} header");
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            &format!("missing {WRAPPED_KEY_HEADER} header"),
        );
    };
    let wrapped = match hex::decode(wrapped_hex) {
        Ok(w) => w,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                &format!("{WRAPPED_KEY_HEADER} header is not hex: {e}"),
            )
        }
    };

    let sealed = match read_body(&parts, body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match key.open(&sealed, &wrapped) {
        Ok(plain) => next.run(with_body(parts, plain)).await,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Request rejected: sealed body did not open");
            error_response(StatusCode::BAD_REQUEST, &trace_id, &e.to_string())
        }
    }
}

/// Checks `HashSHA256` against the plain body when a secret is configured
/// and the header is present, then signs successful responses.
pub async fn verify_signature(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(secret) = state.secret.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let trace_id = trace_id(&parts);
    let bytes = match read_body(&parts, body).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    if let Some(signature) = header_str(&parts, SIGNATURE_HEADER) {
        if let Err(e) = codec::verify(&bytes, &secret, signature) {
            tracing::warn!(trace_id = %trace_id, error = %e, "Request rejected: bad signature");
            return error_response(StatusCode::BAD_REQUEST, &trace_id, &e.to_string());
        }
    }

    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;
    if !response.status().is_success() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                &format!("failed to buffer response: {e}"),
            )
        }
    };
    if let Ok(value) = HeaderValue::from_str(&codec::sign(&body, &secret)) {
        parts.headers.insert(SIGNATURE_HEADER, value);
    }
    Response::from_parts(parts, Body::from(body))
}
