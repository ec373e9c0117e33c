//! Health check endpoint.
//!
//! Liveness only: returns 200 whenever the process is serving requests.
//! Dependency health (the database pool) surfaces through request errors
//! and metrics rather than a separate readiness probe.

use axum::http::StatusCode;

/// Simple liveness check for load balancers.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
