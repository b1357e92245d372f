//! Broker owner task.
//!
//! A single task holds the broker channel. Consumers and the publish gateway
//! reach it through a [`BrokerHandle`], which sends commands over an mpsc
//! channel and waits for the reply on a oneshot. Declares, publishes and
//! consumer setup are therefore serialized, whatever guarantees the
//! underlying transport gives about interleaved use of one channel.
//!
//! Queues are declared lazily: the first time a session addresses a queue,
//! whether to publish or to consume, the owner declares it and remembers
//! that it did. A queue some other service already declared with different
//! arguments is accepted as it is.

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::{BrokerChannel, BrokerConnection, BrokerError, DeliveryStream};

/// Pending commands buffered ahead of the owner task.
const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, BrokerError>>;

/// Requests served by the broker owner task.
pub enum BrokerCommand {
    Declare {
        queue: String,
        reply: Reply<()>,
    },
    Publish {
        queue: String,
        body: Vec<u8>,
        reply: Reply<()>,
    },
    Consume {
        queue: String,
        consumer_tag: String,
        reply: Reply<DeliveryStream>,
    },
}

/// Cloneable handle to the broker owner task.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    /// Wrap an existing command sender.
    pub fn new(tx: mpsc::Sender<BrokerCommand>) -> Self {
        Self { tx }
    }

    /// Declare a queue. Idempotent within a session.
    pub async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Declare {
            queue: queue.to_string(),
            reply,
        })
        .await
    }

    /// Publish a raw body to `queue`, declaring it first if needed.
    pub async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Publish {
            queue: queue.to_string(),
            body,
            reply,
        })
        .await
    }

    /// Open an auto-acknowledged subscription on `queue`.
    pub async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        self.request(|reply| BrokerCommand::Consume {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
            reply,
        })
        .await
    }

    /// Whether the owner task is still accepting commands.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> BrokerCommand,
    ) -> Result<T, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| BrokerError::Unavailable)?;
        rx.await.map_err(|_| BrokerError::Unavailable)?
    }
}

/// Open the owner's channels on `connection` and spawn the owner task.
///
/// The task runs until `shutdown` is cancelled or every handle is dropped.
pub async fn spawn_broker<B: BrokerConnection>(
    connection: B,
    shutdown: CancellationToken,
) -> Result<(BrokerHandle, JoinHandle<()>), BrokerError> {
    let consuming = connection.open_channel().await?;
    let publishing = connection.open_channel().await?;

    let owner = Owner {
        connection,
        consuming,
        publishing,
        declared: HashSet::new(),
    };

    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run_owner(owner, rx, shutdown));
    Ok((BrokerHandle::new(tx), task))
}

async fn run_owner<B: BrokerConnection>(
    mut owner: Owner<B>,
    mut rx: mpsc::Receiver<BrokerCommand>,
    shutdown: CancellationToken,
) {
    info!("broker_owner_started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("broker_owner_stopping");
                break;
            }
            command = rx.recv() => {
                match command {
                    Some(command) => owner.handle(command).await,
                    None => {
                        debug!("broker_owner_handles_dropped");
                        break;
                    }
                }
            }
        }
    }

    // Anything still queued is answered with Unavailable when `rx` drops.
    rx.close();
    info!("broker_owner_stopped");
}

/// Consumers and gateway publishes use separate channels. A gateway
/// declare the broker refuses closes only the publishing channel, which
/// the owner reopens; the consumer subscriptions stay up.
struct Owner<B: BrokerConnection> {
    connection: B,
    consuming: B::Channel,
    publishing: B::Channel,
    declared: HashSet<String>,
}

impl<B: BrokerConnection> Owner<B> {
    async fn handle(&mut self, command: BrokerCommand) {
        match command {
            BrokerCommand::Declare { queue, reply } => {
                let result = self.ensure_declared(&queue).await;
                let _ = reply.send(result);
            }
            BrokerCommand::Publish { queue, body, reply } => {
                let result = self.publish(&queue, &body).await;
                let _ = reply.send(result);
            }
            BrokerCommand::Consume {
                queue,
                consumer_tag,
                reply,
            } => {
                let result = match self.ensure_declared(&queue).await {
                    Ok(()) => self.consuming.consume(&queue, &consumer_tag).await,
                    Err(e) => Err(e),
                };
                if result.is_ok() {
                    info!(
                        queue = %queue,
                        consumer_tag = %consumer_tag,
                        "rabbitmq_consumer_started"
                    );
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn ensure_declared(&mut self, queue: &str) -> Result<(), BrokerError> {
        if self.declared.contains(queue) {
            return Ok(());
        }

        self.consuming.declare_queue(queue).await?;
        self.declared.insert(queue.to_string());

        info!(queue = %queue, "rabbitmq_queue_declared");
        Ok(())
    }

    /// Declare on the publishing channel. A queue that already exists with
    /// other arguments makes the broker close the channel; it is then
    /// reopened and the queue checked passively instead.
    async fn ensure_declared_for_publish(&mut self, queue: &str) -> Result<(), BrokerError> {
        if self.declared.contains(queue) {
            return Ok(());
        }

        match self.publishing.declare_queue(queue).await {
            Ok(()) => {}
            Err(e) if !self.publishing.is_open() => {
                warn!(queue = %queue, error = %e, "rabbitmq_declare_refused");
                self.reopen_publishing().await?;
                self.publishing.declare_queue_passive(queue).await?;
            }
            Err(e) => return Err(e),
        }

        self.declared.insert(queue.to_string());
        info!(queue = %queue, "rabbitmq_queue_declared");
        Ok(())
    }

    async fn reopen_publishing(&mut self) -> Result<(), BrokerError> {
        self.publishing = self.connection.open_channel().await?;
        info!("rabbitmq_publish_channel_reopened");
        Ok(())
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        if !self.publishing.is_open() {
            self.reopen_publishing().await?;
        }
        self.ensure_declared_for_publish(queue).await?;

        if let Err(e) = self.publishing.publish(queue, body).await {
            warn!(queue = %queue, error = %e, "rabbitmq_publish_failed");
            return Err(e);
        }

        info!(queue = %queue, body_length = body.len(), "rabbitmq_message_published");
        Ok(())
    }
}
