//! Notification relay - RabbitMQ to SMTP.
//!
//! Other services enqueue short text messages through the publish gateway;
//! one consumer loop per queue decodes them and sends templated email.
//!
//! ## Architecture
//!
//! ```text
//! POST /publish → Publisher → broker owner task → queue
//!                                                   ↓
//!        SMTP ← Dispatcher ← decode_message ← consumer loop
//! ```
//!
//! The [`supervisor`] restarts the whole broker side after any fault.

pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod html;
pub mod mail;
pub mod process;
pub mod queue;
pub mod relay;
pub mod supervisor;
#[cfg(test)]
pub(crate) mod testing;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{DispatchError, Dispatcher, VERIFICATION_SUBJECT};
pub use process::{decode_message, DecodeError};
pub use queue::{
    BrokerError, DecodedMessage, NotificationPayload, Publisher, QueueKind, QueueName,
    VerificationPayload, NOTIFICATION_QUEUE, VERIFICATION_QUEUE,
};
pub use relay::Relay;
pub use supervisor::{supervise, RestartPolicy};
pub use web::AppState;
