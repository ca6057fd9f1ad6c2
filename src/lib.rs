//! Request/response logging middleware for axum.
//!
//! [`middleware::http_logger`] writes one line per request and one per
//! response, joined by a correlation id. How much each line carries depends
//! on the [`level::LogLevel`] in effect when the request arrives.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

pub mod config;
pub mod correlation;
pub mod level;
pub mod middleware;
pub mod routes;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod test_support;

use middleware::{http_logger, HttpLogger};

#[derive(Clone)]
pub struct AppState {
    pub logger: HttpLogger,
}

/// Demo service wrapped in the request logger.
pub fn create_app(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/echo", post(routes::echo::echo))
        .route("/stream", get(routes::echo::stream))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    state.logger.clone(),
                    http_logger,
                ))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}
