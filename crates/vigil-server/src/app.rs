use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use crate::{api, logging, middleware};

/// Build the HTTP application with all routes and middleware.
///
/// Update routes verify their payload (sealed body, then signature); every
/// route accepts gzip bodies. Logging wraps everything.
pub fn build_http_app(state: AppState) -> Router {
    let updates = Router::new()
        .route("/update/", post(api::update_json))
        .route("/updates/", post(api::update_batch))
        .layer(from_fn_with_state(state.clone(), middleware::verify_signature))
        .layer(from_fn_with_state(state.clone(), middleware::open_sealed));

    Router::new()
        .route("/", get(api::index))
        .route("/ping", get(api::ping))
        .route("/update/{kind}/{key}/{value}", post(api::update_path))
        .route("/value/", post(api::value_json))
        .route("/value/{kind}/{key}", get(api::value_path))
        .merge(updates)
        .layer(from_fn(middleware::inflate_gzip))
        .layer(from_fn(logging::request_logging))
        .with_state(state)
}
