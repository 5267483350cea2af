//! Metrics collector: an axum HTTP service in front of a [`vigil_storage::MetricStore`].

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod state;
