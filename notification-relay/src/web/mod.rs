//! Web server module for the publish gateway.
//!
//! This module provides a thin HTTP front for the broker that:
//! - Accepts `{queue_name, body}` publish requests
//! - Enqueues the raw body on the named queue
//! - Answers once the broker has accepted the message
//! - Exposes Prometheus metrics on `/metrics`

pub mod handlers;
pub mod metrics;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{health, publish, AppState, HealthResponse, PublishRequest, PublishResponse};
pub use self::metrics::{render_metrics, setup_metrics_recorder, track_metrics};

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/publish", post(publish))
        .route_layer(middleware::from_fn(track_metrics))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
