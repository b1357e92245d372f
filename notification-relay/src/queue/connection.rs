//! Broker connection lifecycle.
//!
//! A [`BrokerSession`] is one AMQP connection. The broker owner task opens
//! its channels on it. The session is valid until the first connection
//! fault; after that the relay tears everything down and the supervisor
//! builds a fresh session.

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::channel::BrokerError;

/// A live connection to the broker.
pub struct BrokerSession {
    connection: Arc<Connection>,
}

impl BrokerSession {
    /// Connect to the broker.
    ///
    /// There is no retry here; a failure is a connection fault and is left
    /// to the supervisor.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        info!(url_length = url.len(), "rabbitmq_connecting");

        let connection = Connection::connect(url, ConnectionProperties::default()).await?;

        info!("rabbitmq_connected");

        Ok(Self {
            connection: Arc::new(connection),
        })
    }

    /// The connection handed to the broker owner task.
    pub fn connection(&self) -> Arc<Connection> {
        Arc::clone(&self.connection)
    }

    /// Returns a token that is cancelled when the transport reports a
    /// connection-level error.
    pub fn fault_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let signal = token.clone();
        self.connection.on_error(move |err| {
            error!(error = %err, "rabbitmq_connection_error");
            signal.cancel();
        });
        token
    }

    /// Close the connection gracefully, taking its channels with it.
    pub async fn close(self) {
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Normal shutdown").await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }

        info!("rabbitmq_session_closed");
    }
}
