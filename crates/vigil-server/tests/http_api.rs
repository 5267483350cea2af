mod common;

use axum::http::StatusCode;
use common::{assert_status, build_file_context, build_test_context, request_json, request_text};
use serde_json::json;
use vigil_common::MetricKind;
use vigil_storage::StorageBackend;
use vigil_storage::file::FileBackend;

#[tokio::test]
async fn ping_reports_healthy_store() {
    let ctx = build_test_context().unwrap();
    let (status, _) = request_text(&ctx.app, "GET", "/ping").await;
    assert_status(status, StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_trace_id() {
    let ctx = build_test_context().unwrap();
    let req = axum::http::Request::builder()
        .uri("/ping")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = common::send(&ctx.app, req).await;
    let trace_id = resp.headers().get("X-Trace-Id").unwrap().to_str().unwrap();
    assert_eq!(trace_id.len(), 16);
}

#[tokio::test]
async fn handler_errors_carry_trace_id_and_reason() {
    let ctx = build_test_context().unwrap();
    let req = axum::http::Request::builder()
        .uri("/value/gauge/Missing")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = common::send(&ctx.app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers().contains_key("X-Trace-Id"));
    let body = String::from_utf8(common::body_bytes(resp).await).unwrap();
    assert!(body.contains("Missing"), "{body}");
}

#[tokio::test]
async fn path_updates_store_and_read_back() {
    let ctx = build_test_context().unwrap();

    let (status, _) = request_text(&ctx.app, "POST", "/update/gauge/Alloc/123.5").await;
    assert_status(status, StatusCode::OK);
    let (status, body) = request_text(&ctx.app, "GET", "/value/gauge/Alloc").await;
    assert_status(status, StatusCode::OK);
    assert_eq!(body, "123.5");

    for delta in ["12", "2", "8", "-7"] {
        let (status, _) =
            request_text(&ctx.app, "POST", &format!("/update/counter/PollCount/{delta}")).await;
        assert_status(status, StatusCode::OK);
    }
    let (_, body) = request_text(&ctx.app, "GET", "/value/counter/PollCount").await;
    assert_eq!(body, "15");
}

#[tokio::test]
async fn path_update_rejects_bad_input() {
    let ctx = build_test_context().unwrap();

    let (status, _) = request_text(&ctx.app, "POST", "/update/histogram/Alloc/1").await;
    assert_status(status, StatusCode::BAD_REQUEST);
    let (status, _) = request_text(&ctx.app, "POST", "/update/counter/PollCount/1.5").await;
    assert_status(status, StatusCode::BAD_REQUEST);
    let (status, _) = request_text(&ctx.app, "POST", "/update/gauge/Alloc/none").await;
    assert_status(status, StatusCode::BAD_REQUEST);

    assert!(ctx.state.store.get_all().is_empty());
}

#[tokio::test]
async fn missing_metrics_are_not_found() {
    let ctx = build_test_context().unwrap();

    let (status, _) = request_text(&ctx.app, "GET", "/value/gauge/Nothing").await;
    assert_status(status, StatusCode::NOT_FOUND);
    let (status, _) = request_text(&ctx.app, "GET", "/value/summary/Nothing").await;
    assert_status(status, StatusCode::BAD_REQUEST);

    // Same key, other kind.
    request_text(&ctx.app, "POST", "/update/gauge/Shared/1").await;
    let (status, _) = request_text(&ctx.app, "GET", "/value/counter/Shared").await;
    assert_status(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_echoes_stored_value() {
    let ctx = build_test_context().unwrap();

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/update/",
        json!({"id": "Hits", "type": "counter", "delta": 5}),
    )
    .await;
    assert_status(status, StatusCode::OK);
    assert_eq!(body.unwrap(), json!({"id": "Hits", "type": "counter", "delta": 5}));

    let (_, body) = request_json(
        &ctx.app,
        "POST",
        "/update/",
        json!({"id": "Hits", "type": "counter", "delta": 3}),
    )
    .await;
    assert_eq!(body.unwrap()["delta"], 8);

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/update/",
        json!({"id": "Alloc", "type": "gauge", "value": 2.5}),
    )
    .await;
    assert_status(status, StatusCode::OK);
    assert_eq!(body.unwrap()["value"], 2.5);
}

#[tokio::test]
async fn json_update_rejects_malformed_bodies() {
    let ctx = build_test_context().unwrap();

    let cases = [
        json!({"id": "Alloc", "type": "gauge"}),
        json!({"id": "Hits", "type": "counter", "value": 1.0}),
        json!({"id": "Alloc", "type": "histogram", "value": 1.0}),
        json!({"type": "gauge", "value": 1.0}),
        json!("not an object"),
    ];
    for case in cases {
        let (status, _) = request_json(&ctx.app, "POST", "/update/", case.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case {case}");
    }
    assert!(ctx.state.store.get_all().is_empty());
}

#[tokio::test]
async fn batch_update_applies_everything_or_nothing() {
    let ctx = build_test_context().unwrap();

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        json!([
            {"id": "Alloc", "type": "gauge", "value": 100.0},
            {"id": "PollCount", "type": "counter", "delta": 2},
            {"id": "PollCount", "type": "counter", "delta": 3}
        ]),
    )
    .await;
    assert_status(status, StatusCode::OK);
    let table = ctx.state.store.get_all();
    assert_eq!(table.counters["PollCount"], 5);
    assert_eq!(table.gauges["Alloc"], 100.0);

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        json!([
            {"id": "Alloc", "type": "gauge", "value": 1.0},
            {"id": "Broken", "type": "counter"}
        ]),
    )
    .await;
    assert_status(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.state.store.get_all(), table);
}

#[tokio::test]
async fn json_value_lookup() {
    let ctx = build_test_context().unwrap();
    request_text(&ctx.app, "POST", "/update/gauge/Alloc/7.25").await;

    let (status, body) =
        request_json(&ctx.app, "POST", "/value/", json!({"id": "Alloc", "type": "gauge"})).await;
    assert_status(status, StatusCode::OK);
    assert_eq!(body.unwrap(), json!({"id": "Alloc", "type": "gauge", "value": 7.25}));

    let (status, _) =
        request_json(&ctx.app, "POST", "/value/", json!({"id": "Alloc", "type": "counter"})).await;
    assert_status(status, StatusCode::NOT_FOUND);

    let (status, _) =
        request_json(&ctx.app, "POST", "/value/", json!({"id": "Alloc", "type": "timer"})).await;
    assert_status(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn index_lists_metrics_sorted() {
    let ctx = build_test_context().unwrap();
    request_text(&ctx.app, "POST", "/update/gauge/Zeta/1").await;
    request_text(&ctx.app, "POST", "/update/gauge/Alpha/2").await;
    request_text(&ctx.app, "POST", "/update/counter/PollCount/4").await;

    let (status, html) = request_text(&ctx.app, "GET", "/").await;
    assert_status(status, StatusCode::OK);
    let alpha = html.find("Alpha: 2").unwrap();
    let zeta = html.find("Zeta: 1").unwrap();
    assert!(alpha < zeta);
    assert!(html.contains("PollCount: 4"));
}

#[tokio::test]
async fn updates_are_mirrored_to_file_backend() {
    let ctx = build_file_context().unwrap();
    request_text(&ctx.app, "POST", "/update/counter/PollCount/4").await;
    request_text(&ctx.app, "POST", "/update/counter/PollCount/6").await;

    let backend = FileBackend::open(&ctx.temp_dir.path().join("metrics.json")).unwrap();
    assert_eq!(
        backend.get(MetricKind::Counter, "PollCount").unwrap(),
        Some(vigil_storage::MetricValue::Counter(10))
    );
}
