//! Consumer loops, one per known queue.
//!
//! Each loop declares its queue, subscribes with auto-acknowledgement and
//! then decodes and dispatches messages one at a time. Deliveries are
//! acknowledged by the broker as soon as they arrive, so a message whose
//! decode or dispatch fails is gone (at-most-once).
//!
//! Decode and dispatch failures are logged and the loop moves on. The loop
//! only ends on shutdown, or when the broker closes the subscription; the
//! latter is a connection fault and is returned to the relay.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::process::decode_message;
use crate::queue::{BrokerError, BrokerHandle, QueueKind};

/// What happened to a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Decoded and handed to the mailer.
    Dispatched,
    /// Did not match the queue's format; dropped.
    Rejected,
    /// Decoded, but rendering or sending failed; dropped.
    Failed,
}

impl MessageOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageOutcome::Dispatched => "dispatched",
            MessageOutcome::Rejected => "rejected",
            MessageOutcome::Failed => "failed",
        }
    }
}

/// Consumer tag announced to the broker for `kind`.
pub fn consumer_tag(kind: QueueKind) -> String {
    format!("notification-relay-{kind}")
}

/// Run the consumer loop for `kind` until shutdown or a broker fault.
pub async fn run(
    kind: QueueKind,
    broker: BrokerHandle,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<(), BrokerError> {
    let queue = kind.queue_name();

    broker.declare(queue).await?;
    let deliveries = broker.consume(queue, &consumer_tag(kind)).await?;

    info!(queue = queue, "consumer_ready");

    consume(kind, deliveries, &dispatcher, &shutdown).await
}

/// Drive a delivery stream through decode and dispatch.
pub async fn consume<S>(
    kind: QueueKind,
    mut deliveries: S,
    dispatcher: &Dispatcher,
    shutdown: &CancellationToken,
) -> Result<(), BrokerError>
where
    S: Stream<Item = Result<Vec<u8>, BrokerError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(queue = %kind, "consumer_stopping");
                return Ok(());
            }
            delivery = deliveries.next() => {
                match delivery {
                    Some(Ok(body)) => {
                        let outcome = handle_message(kind, &body, dispatcher).await;
                        metrics::counter!(
                            "relay_messages_total",
                            "queue" => kind.queue_name(),
                            "outcome" => outcome.as_str()
                        )
                        .increment(1);
                    }
                    Some(Err(e)) => {
                        error!(queue = %kind, error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!(queue = %kind, "rabbitmq_consumer_closed");
                        return Err(BrokerError::ConsumerClosed {
                            queue: kind.queue_name().to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Decode one raw message and dispatch it.
pub async fn handle_message(
    kind: QueueKind,
    body: &[u8],
    dispatcher: &Dispatcher,
) -> MessageOutcome {
    info!(queue = %kind, body_length = body.len(), "message_received");

    let message = match decode_message(kind, body) {
        Ok(message) => message,
        Err(e) => {
            error!(
                queue = %kind,
                error = %e,
                body_preview = %String::from_utf8_lossy(&body[..body.len().min(200)]),
                "message_decode_failed"
            );
            return MessageOutcome::Rejected;
        }
    };

    match dispatcher.deliver(&message).await {
        Ok(()) => {
            info!(queue = %kind, "message_processed");
            MessageOutcome::Dispatched
        }
        Err(e) => {
            warn!(queue = %kind, error = %e, "message_dropped");
            MessageOutcome::Failed
        }
    }
}
