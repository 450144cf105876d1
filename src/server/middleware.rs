//! Request tracing middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

/// Log method, path, status and latency for every request.
///
/// Bodies are never logged since they carry personal health data.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = next.run(req).await;

    let status = resp.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as u64;
    if resp.status().is_server_error() {
        warn!(%method, path = %path, status, latency_ms, "request failed");
    } else {
        info!(%method, path = %path, status, latency_ms, "request");
    }
    resp
}
