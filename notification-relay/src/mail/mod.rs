//! Outbound mail.
//!
//! The relay only needs one capability from the mail side: hand a rendered
//! HTML body to a transport for a list of recipients. [`MailSender`] is that
//! capability; [`SmtpMailer`] implements it over an SMTP relay.

pub mod smtp;

use async_trait::async_trait;
use thiserror::Error;

pub use smtp::{build_message, SmtpMailer};

/// Mail delivery failures.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// A recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    #[error("message has no recipients")]
    NoRecipients,
}

/// Sends one HTML message to a list of recipients.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), MailError>;
}
