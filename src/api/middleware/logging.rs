//! Request logging middleware.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{debug, info, warn};

/// Log method, path, status and latency of every request.
///
/// Health probes log at debug; server errors at warn. Stream upgrades are
/// logged when the upgrade response is sent, not when the stream ends.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis();
    if response.status().is_server_error() {
        warn!(%method, %path, status, duration_ms, "Request failed");
    } else if path.ends_with("/health") {
        debug!(%method, %path, status, duration_ms, "Request completed");
    } else {
        info!(%method, %path, status, duration_ms, "Request completed");
    }

    response
}
