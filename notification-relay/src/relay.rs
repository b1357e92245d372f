//! One relay instance: broker session, owner task and consumer loops.
//!
//! [`Relay::run_once`] is the startup sequence the supervisor repeats after
//! every fault. It connects, installs the session into the shared
//! [`Publisher`], starts one consumer loop per known queue and then waits
//! for either shutdown or the first fault. On a fault the session is torn
//! down completely; nothing from it is reused by the next attempt.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consumer;
use crate::dispatch::Dispatcher;
use crate::queue::{
    spawn_broker, BrokerConnection, BrokerError, BrokerSession, Publisher, QueueKind,
};

/// Everything a relay instance needs; cheap to clone.
#[derive(Clone)]
pub struct Relay {
    amqp_url: String,
    publisher: Publisher,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(
        amqp_url: String,
        publisher: Publisher,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            amqp_url,
            publisher,
            dispatcher,
            shutdown,
        }
    }

    /// Connect to the broker and run until shutdown or a fault.
    pub async fn run_once(&self) -> Result<()> {
        let session = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            session = BrokerSession::connect(&self.amqp_url) => {
                session.context("Failed to connect to RabbitMQ")?
            }
        };

        let fault = session.fault_token();
        let result = self.run_session(session.connection(), fault).await;

        session.close().await;
        result.context("Relay session ended with a fault")
    }

    /// Run the owner task and consumer loops on an open connection.
    ///
    /// `fault` is cancelled by the transport when the connection fails.
    pub async fn run_session<B: BrokerConnection>(
        &self,
        connection: B,
        fault: CancellationToken,
    ) -> Result<(), BrokerError> {
        let session = self.shutdown.child_token();
        let (handle, owner) = spawn_broker(connection, session.clone()).await?;

        self.publisher.install(handle.clone()).await;

        let mut consumers = JoinSet::new();
        for kind in QueueKind::ALL {
            consumers.spawn(consumer::run(
                kind,
                handle.clone(),
                Arc::clone(&self.dispatcher),
                session.clone(),
            ));
        }
        drop(handle);

        info!(consumers = QueueKind::ALL.len(), "relay_running");

        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => Ok(()),
            _ = fault.cancelled() => {
                Err(BrokerError::Fault("connection reported an error".to_string()))
            }
            Some(joined) = consumers.join_next() => match joined {
                Ok(result) => result,
                Err(e) => Err(BrokerError::Fault(format!("consumer task failed: {e}"))),
            },
        };

        // Gateway publishes fail fast from here on.
        self.publisher.clear().await;
        session.cancel();

        match &outcome {
            Ok(()) => {
                // Let in-flight dispatches finish.
                while consumers.join_next().await.is_some() {}
            }
            Err(e) => {
                error!(error = %e, "relay_session_fault");
                consumers.shutdown().await;
            }
        }

        if let Err(e) = owner.await {
            error!(error = %e, "broker_owner_join_failed");
        }

        info!(faulted = outcome.is_err(), "relay_session_closed");
        outcome
    }
}
