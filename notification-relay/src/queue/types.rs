//! Queue names and the message shapes carried on them.
//!
//! This module defines:
//! - `notification` queue: bulk notifications `[a, b];subject;body`
//! - `verification` queue: single verification codes `recipient;passcode`
//! - [`QueueName`]: a validated, free-form queue name for the publish gateway

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Queue name for bulk notification messages.
pub const NOTIFICATION_QUEUE: &str = "notification";

/// Queue name for email verification messages.
pub const VERIFICATION_QUEUE: &str = "verification";

/// Longest queue name the broker accepts (AMQP short string).
const MAX_QUEUE_NAME_LEN: usize = 255;

/// Prefix the broker reserves for its own queues.
const RESERVED_PREFIX: &str = "amq.";

// =============================================================================
// Known Queues
// =============================================================================

/// The queues this relay consumes from.
///
/// The kind decides how a raw message is decoded and which template renders
/// it; the payload itself carries no type information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Notification,
    Verification,
}

impl QueueKind {
    /// Every queue a consumer loop is started for.
    pub const ALL: [QueueKind; 2] = [QueueKind::Notification, QueueKind::Verification];

    /// Broker-side queue name.
    pub fn queue_name(self) -> &'static str {
        match self {
            QueueKind::Notification => NOTIFICATION_QUEUE,
            QueueKind::Verification => VERIFICATION_QUEUE,
        }
    }

    /// Template used to render messages from this queue.
    pub fn template_name(self) -> &'static str {
        match self {
            QueueKind::Notification => "notification",
            QueueKind::Verification => "verification",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

// =============================================================================
// Queue Names
// =============================================================================

/// Reasons a queue name is refused before it reaches the broker.
///
/// The broker would refuse any of these and close the channel that
/// carried the declare.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueNameError {
    #[error("queue name is empty")]
    Empty,
    #[error("queue name is {0} bytes, the limit is 255")]
    TooLong(usize),
    #[error("queue names starting with \"amq.\" are reserved")]
    Reserved,
}

/// A queue name accepted by the publish gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Validate a free-form queue name.
    pub fn parse(name: impl Into<String>) -> Result<Self, QueueNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(QueueNameError::Empty);
        }
        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(QueueNameError::TooLong(name.len()));
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(QueueNameError::Reserved);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<QueueKind> for QueueName {
    fn from(kind: QueueKind) -> Self {
        Self(kind.queue_name().to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = QueueNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Decoded Payloads
// =============================================================================

/// A bulk notification decoded from the `notification` queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// Recipients in message order; duplicates are kept
    pub recipients: Vec<String>,
    /// Subject line, used verbatim
    pub subject: String,
    /// Text substituted into the `notification` template
    pub body: String,
}

/// A verification code decoded from the `verification` queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPayload {
    /// Single recipient address
    pub recipient: String,
    /// Code substituted into the `verification` template
    pub passcode: String,
}

/// A message decoded according to the queue it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    Notification(NotificationPayload),
    Verification(VerificationPayload),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_name_accepts_free_form() {
        let name = QueueName::parse("event-reminders").unwrap();
        assert_eq!(name.as_str(), "event-reminders");
    }

    #[test]
    fn test_queue_name_rejects_broker_refusals() {
        assert_eq!(QueueName::parse(""), Err(QueueNameError::Empty));
        assert_eq!(QueueName::parse("amq.direct"), Err(QueueNameError::Reserved));
        assert_eq!(
            QueueName::parse("q".repeat(256)),
            Err(QueueNameError::TooLong(256))
        );
        assert!(QueueName::parse("q".repeat(255)).is_ok());
    }

    #[test]
    fn test_queue_name_deserialize_validates() {
        let ok: QueueName = serde_json::from_str("\"notification\"").unwrap();
        assert_eq!(ok, QueueName::from(QueueKind::Notification));

        let err = serde_json::from_str::<QueueName>("\"amq.gen-1\"");
        assert!(err.is_err());
    }
}
