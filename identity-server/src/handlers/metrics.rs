use axum::{http::header, response::IntoResponse};
use prometheus::TEXT_FORMAT;

use crate::services::metrics::get_metrics;

/// Prometheus scrape endpoint.
///
/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], get_metrics())
}
