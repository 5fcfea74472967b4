//! Prometheus metrics endpoint.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};

/// GET /metrics -- Prometheus text exposition format.
pub async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::render()
        .unwrap_or_else(|| "# No metrics recorder installed\n".to_string());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
