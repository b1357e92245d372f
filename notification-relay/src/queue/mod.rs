//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Queue names and decoded message types
//! - The broker session and its owner task (one channel for consumers,
//!   one for gateway publishes)
//! - The publisher used by the HTTP gateway
//!
//! ## Architecture
//!
//! ```text
//! Gateway → Publisher → BrokerHandle → owner task (channels) → queue
//!                                                           ↓
//!                           Consumer loop ← DeliveryStream ←┘
//! ```

pub mod broker;
pub mod channel;
pub mod connection;
#[cfg(test)]
pub(crate) mod memory;
pub mod publisher;
pub mod types;

pub use broker::{spawn_broker, BrokerHandle};
pub use channel::{BrokerChannel, BrokerConnection, BrokerError, DeliveryStream};
pub use connection::BrokerSession;
pub use publisher::Publisher;
pub use types::{
    DecodedMessage, NotificationPayload, QueueKind, QueueName, QueueNameError,
    VerificationPayload, NOTIFICATION_QUEUE, VERIFICATION_QUEUE,
};
