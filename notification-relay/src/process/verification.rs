//! Decoding of `verification` queue messages.
//!
//! Wire format: `recipient;passcode`.

use crate::queue::VerificationPayload;

use super::DecodeError;

/// Decode a verification message into its recipient and passcode.
pub fn decode_verification(raw: &str) -> Result<VerificationPayload, DecodeError> {
    let parts: Vec<&str> = raw.split(';').collect();
    let [recipient, passcode] = parts.as_slice() else {
        return Err(DecodeError::FieldCount {
            expected: 2,
            found: parts.len(),
        });
    };

    Ok(VerificationPayload {
        recipient: recipient.trim().to_string(),
        passcode: passcode.trim().to_string(),
    })
}
