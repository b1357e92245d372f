//! Gateway endpoint handlers.
//!
//! `POST /publish` is the only way other services enqueue notification and
//! verification requests. It validates the queue name, publishes the raw
//! body and returns as soon as the broker has accepted it.

use axum::{extract::State, http::StatusCode, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::queue::{BrokerError, Publisher, QueueName};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Publisher,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(publisher: Publisher) -> Self {
        Self {
            publisher,
            metrics: None,
        }
    }

    /// Serve `handle` on `GET /metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub broker_connected: bool,
}

/// Health check endpoint. Always 200; reports whether a broker session is
/// currently installed.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        broker_connected: state.publisher.is_connected().await,
    })
}

// =============================================================================
// Publish
// =============================================================================

/// Publish request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Target queue; used directly as the routing key
    pub queue_name: String,
    /// Raw message body
    pub body: String,
}

/// Publish response.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishResponse {
    fn new(status: &str, error: Option<String>) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
            error,
        })
    }
}

/// Publish endpoint.
///
/// - `200 enqueued`: the broker accepted the message
/// - `400 invalid_queue`: the broker would refuse the queue name
/// - `503 unavailable`: no broker session (connecting or restarting)
/// - `500 error`: the broker rejected the publish
pub async fn publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> (StatusCode, Json<PublishResponse>) {
    info!(
        queue = %request.queue_name,
        body_length = request.body.len(),
        "publish_request_received"
    );

    let queue = match QueueName::parse(request.queue_name) {
        Ok(queue) => queue,
        Err(e) => {
            warn!(error = %e, "publish_invalid_queue");
            return (
                StatusCode::BAD_REQUEST,
                PublishResponse::new("invalid_queue", Some(e.to_string())),
            );
        }
    };

    match state.publisher.publish(&queue, &request.body).await {
        Ok(()) => {
            info!(queue = %queue, "publish_enqueued");
            (StatusCode::OK, PublishResponse::new("enqueued", None))
        }
        Err(BrokerError::Unavailable) => {
            warn!(queue = %queue, "publish_broker_unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                PublishResponse::new("unavailable", Some(BrokerError::Unavailable.to_string())),
            )
        }
        Err(e) => {
            error!(queue = %queue, error = %e, "publish_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                PublishResponse::new("error", Some(e.to_string())),
            )
        }
    }
}
