//! The broker operations the relay needs, behind one trait.
//!
//! [`BrokerChannel`] is implemented for `lapin::Channel` and
//! [`BrokerConnection`] for a shared `lapin::Connection`; tests use an
//! in-memory implementation instead of a live RabbitMQ.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection,
};
use thiserror::Error;
use tracing::info;

/// Content type stamped on every published message.
pub const CONTENT_TYPE: &str = "text/plain";

/// Stream of raw message bodies from one queue.
pub type DeliveryStream = BoxStream<'static, Result<Vec<u8>, BrokerError>>;

/// Broker-level failures. All of them are connection faults from the
/// point of view of the relay, except a publish error on the gateway path,
/// which is handed back to the caller.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("broker session is not available")]
    Unavailable,

    #[error("consumer for queue {queue} was closed by the broker")]
    ConsumerClosed { queue: String },

    #[error("broker connection fault: {0}")]
    Fault(String),
}

/// Queue operations on a live broker channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declare `queue` if it does not exist yet. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Check that `queue` exists without asserting its arguments.
    async fn declare_queue_passive(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publish `body` on the default exchange with `queue` as routing key,
    /// returning once the broker has accepted it.
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError>;

    /// Start an auto-acknowledged subscription on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, BrokerError>;

    /// False once the broker has closed the channel, e.g. after a failed
    /// declare.
    fn is_open(&self) -> bool;
}

/// Opens channels on a live connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    async fn open_channel(&self) -> Result<Self::Channel, BrokerError>;
}

#[async_trait]
impl BrokerConnection for Arc<Connection> {
    type Channel = Channel;

    async fn open_channel(&self) -> Result<Channel, BrokerError> {
        let channel = self.create_channel().await?;
        info!(channel_id = channel.id(), "rabbitmq_channel_created");
        Ok(channel)
    }
}

#[async_trait]
impl BrokerChannel for Channel {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        // Non-durable, non-exclusive, kept when unused.
        self.queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await?;
        Ok(())
    }

    async fn declare_queue_passive(&self, queue: &str) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            passive: true,
            ..Default::default()
        };
        self.queue_declare(queue, options, FieldTable::default()).await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        self.basic_publish(
            "",
            queue,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default().with_content_type(CONTENT_TYPE.into()),
        )
        .await?
        .await?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        // Auto-ack: a delivery counts as handled the moment it arrives.
        let consumer = self
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let deliveries = StreamExt::map(consumer, |delivery| {
            delivery.map(|d| d.data).map_err(BrokerError::from)
        });
        Ok(deliveries.boxed())
    }

    fn is_open(&self) -> bool {
        self.status().connected()
    }
}
