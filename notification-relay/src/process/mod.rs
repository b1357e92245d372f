//! Message decoding module.
//!
//! Raw messages carry no type information; the queue they arrived on decides
//! how they are read.
//!
//! ## Processing Flow
//!
//! ```text
//! (QueueKind, RawMessage) → decode_message() → DecodedMessage
//! ```

pub mod notification;
pub mod verification;

use thiserror::Error;
use tracing::debug;

use crate::queue::{DecodedMessage, QueueKind};

pub use notification::decode_notification;
pub use verification::decode_verification;

/// A payload that does not match its queue's format.
///
/// Decoding never yields a partial payload; the message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected {expected} ';'-separated fields, found {found}")]
    FieldCount { expected: usize, found: usize },
}

/// Decode a raw message according to the queue it was consumed from.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn decode_message(kind: QueueKind, raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let text = String::from_utf8_lossy(raw);

    debug!(queue = %kind, body_length = raw.len(), "message_decode_start");

    let message = match kind {
        QueueKind::Notification => DecodedMessage::Notification(decode_notification(&text)?),
        QueueKind::Verification => DecodedMessage::Verification(decode_verification(&text)?),
    };

    Ok(message)
}
