#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use vigil_server::app;
use vigil_server::state::AppState;
use vigil_storage::file::FileBackend;
use vigil_storage::null::NullBackend;
use vigil_storage::MetricStore;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn rebuild(&mut self, state: AppState) {
        self.app = app::build_http_app(state.clone());
        self.state = state;
    }
}

/// In-memory store, no secret, no private key.
pub fn build_test_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let state = AppState::new(Arc::new(MetricStore::new(Arc::new(NullBackend), true)));
    let app = app::build_http_app(state.clone());
    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

/// Store mirrored synchronously to a snapshot file in the temp dir.
pub fn build_file_context() -> Result<TestContext> {
    let temp_dir = tempfile::tempdir()?;
    let backend = FileBackend::open(&temp_dir.path().join("metrics.json"))?;
    let state = AppState::new(Arc::new(MetricStore::new(Arc::new(backend), true)));
    let app = app::build_http_app(state.clone());
    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

pub async fn send(app: &axum::Router, req: Request<Body>) -> Response {
    app.clone()
        .oneshot(req)
        .await
        .expect("request should succeed")
}

pub async fn body_bytes(resp: Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should be readable")
        .to_vec()
}

pub async fn request_text(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let resp = send(app, req).await;
    let status = resp.status();
    let body = body_bytes(resp).await;
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Option<Value>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    let resp = send(app, req).await;
    let status = resp.status();
    let bytes = body_bytes(resp).await;
    (status, serde_json::from_slice(&bytes).ok())
}

pub fn assert_status(status: StatusCode, expected: StatusCode) {
    assert_eq!(status, expected, "unexpected status");
}
