//! Decoding of `notification` queue messages.
//!
//! Wire format: `[a@x.com, b@x.com];subject;body`.

use crate::queue::NotificationPayload;

use super::DecodeError;

/// Separator between the recipients inside the brackets.
const RECIPIENT_SEPARATOR: &str = ", ";

/// Decode a notification message.
///
/// The message must split into exactly three `;`-separated parts. Subject
/// and body are taken verbatim; recipients are unwrapped from their
/// brackets and trimmed one by one.
pub fn decode_notification(raw: &str) -> Result<NotificationPayload, DecodeError> {
    let parts: Vec<&str> = raw.split(';').collect();
    let [recipients, subject, body] = parts.as_slice() else {
        return Err(DecodeError::FieldCount {
            expected: 3,
            found: parts.len(),
        });
    };

    let recipients = recipients
        .trim_matches(|c| c == '[' || c == ']')
        .split(RECIPIENT_SEPARATOR)
        .map(|address| address.trim().to_string())
        .collect();

    Ok(NotificationPayload {
        recipients,
        subject: subject.to_string(),
        body: body.to_string(),
    })
}
