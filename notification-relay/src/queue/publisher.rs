//! Publish gateway onto the broker.
//!
//! The [`Publisher`] is shared by the HTTP handlers. It holds the handle to
//! the current broker session; the relay installs a handle when a session
//! comes up and clears it on a fault, so publishes during a restart fail
//! fast with [`BrokerError::Unavailable`] instead of touching a dead channel.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::broker::BrokerHandle;
use super::channel::BrokerError;
use super::types::QueueName;

/// Shared entry point for enqueueing raw messages.
#[derive(Clone, Default)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

#[derive(Default)]
struct PublisherInner {
    session: RwLock<Option<BrokerHandle>>,
}

impl Publisher {
    /// Create a publisher with no session installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handle of a freshly started broker session.
    pub async fn install(&self, handle: BrokerHandle) {
        *self.inner.session.write().await = Some(handle);
        metrics::gauge!("relay_broker_connected").set(1.0);
        info!("rabbitmq_publisher_session_installed");
    }

    /// Forget the current session after a fault or on shutdown.
    pub async fn clear(&self) {
        if self.inner.session.write().await.take().is_some() {
            metrics::gauge!("relay_broker_connected").set(0.0);
            info!("rabbitmq_publisher_session_cleared");
        }
    }

    /// Whether a live session is installed.
    pub async fn is_connected(&self) -> bool {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(BrokerHandle::is_open)
            .unwrap_or(false)
    }

    /// Publish `body` to `queue`.
    ///
    /// Returns once the broker has accepted the message, not once it has
    /// been consumed. Transport errors are returned unchanged; there is no
    /// retry.
    pub async fn publish(&self, queue: &QueueName, body: &str) -> Result<(), BrokerError> {
        // Clone out of the lock so a slow publish does not block `clear`.
        let handle = self.inner.session.read().await.clone();
        let Some(handle) = handle else {
            warn!(queue = %queue, "rabbitmq_publish_without_session");
            return Err(BrokerError::Unavailable);
        };

        handle.publish(queue.as_str(), body.as_bytes().to_vec()).await
    }
}
