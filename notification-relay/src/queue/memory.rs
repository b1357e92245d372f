//! In-memory broker for tests.
//!
//! Mimics the parts of RabbitMQ the relay relies on: the default exchange
//! routes by queue name, messages published to an undeclared queue are
//! dropped, and messages wait in the queue until a consumer subscribes.
//! Redeclaring a queue another service created with different arguments
//! closes the channel, along with its subscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;

use super::channel::{BrokerChannel, BrokerConnection, BrokerError, DeliveryStream};

type Subscriber = UnboundedSender<Result<Vec<u8>, BrokerError>>;

#[derive(Default)]
struct QueueState {
    declare_calls: usize,
    pending: Vec<Vec<u8>>,
    subscriber: Option<(usize, Subscriber)>,
    foreign: bool,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, QueueState>,
    fail_publishes: bool,
    channels_opened: usize,
    closed: HashSet<usize>,
}

impl State {
    fn check_open(&self, channel: usize) -> Result<(), BrokerError> {
        if self.closed.contains(&channel) {
            return Err(BrokerError::Fault(format!("channel {channel} is closed")));
        }
        Ok(())
    }

    fn close_channel(&mut self, channel: usize, reason: &str) -> BrokerError {
        self.closed.insert(channel);
        for queue in self.queues.values_mut() {
            if matches!(&queue.subscriber, Some((id, _)) if *id == channel) {
                queue.subscriber = None;
            }
        }
        BrokerError::Fault(reason.to_string())
    }
}

/// Shared broker state; hand out channels with [`MemoryBroker::channel`].
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

/// A channel onto a [`MemoryBroker`].
pub struct MemoryChannel {
    id: usize,
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self) -> MemoryChannel {
        let mut state = self.state.lock().unwrap();
        state.channels_opened += 1;
        MemoryChannel {
            id: state.channels_opened,
            state: Arc::clone(&self.state),
        }
    }

    pub fn channels_opened(&self) -> usize {
        self.state.lock().unwrap().channels_opened
    }

    /// Create `queue` as if another service declared it with arguments the
    /// relay's declare does not match.
    pub fn preexisting(&self, queue: &str) {
        let mut state = self.state.lock().unwrap();
        state.queues.entry(queue.to_string()).or_default().foreign = true;
    }

    pub fn declare_calls(&self, queue: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(queue).map(|q| q.declare_calls).unwrap_or(0)
    }

    /// Messages sitting in `queue` without a consumer.
    pub fn queued(&self, queue: &str) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .queues
            .get(queue)
            .map(|q| q.pending.clone())
            .unwrap_or_default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state.lock().unwrap().fail_publishes = fail;
    }

    /// Drop every subscription, as the broker does when a connection dies.
    pub fn close_consumers(&self) {
        let mut state = self.state.lock().unwrap();
        for queue in state.queues.values_mut() {
            queue.subscriber = None;
        }
    }
}

#[async_trait]
impl BrokerConnection for MemoryBroker {
    type Channel = MemoryChannel;

    async fn open_channel(&self) -> Result<MemoryChannel, BrokerError> {
        Ok(self.channel())
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.check_open(self.id)?;

        if state.queues.get(queue).is_some_and(|q| q.foreign) {
            return Err(state.close_channel(self.id, "PRECONDITION_FAILED"));
        }

        state.queues.entry(queue.to_string()).or_default().declare_calls += 1;
        Ok(())
    }

    async fn declare_queue_passive(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.check_open(self.id)?;

        if !state.queues.contains_key(queue) {
            return Err(state.close_channel(self.id, "NOT_FOUND"));
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.check_open(self.id)?;
        if state.fail_publishes {
            return Err(BrokerError::Fault("publish refused".to_string()));
        }

        let Some(queue) = state.queues.get_mut(queue) else {
            return Ok(());
        };

        match &queue.subscriber {
            Some((_, tx)) if tx.unbounded_send(Ok(body.to_vec())).is_ok() => {}
            _ => queue.pending.push(body.to_vec()),
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let mut state = self.state.lock().unwrap();
        state.check_open(self.id)?;
        let queue = state.queues.entry(queue.to_string()).or_default();

        let (tx, rx) = unbounded();
        for body in queue.pending.drain(..) {
            let _ = tx.unbounded_send(Ok(body));
        }
        queue.subscriber = Some((self.id, tx));

        Ok(rx.boxed())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().unwrap().closed.contains(&self.id)
    }
}
