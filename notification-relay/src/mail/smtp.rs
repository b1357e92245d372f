//! SMTP delivery via `lettre`.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use super::{MailError, MailSender};
use crate::Config;

/// Mail sender backed by an async SMTP transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    subject_prefix: String,
}

impl SmtpMailer {
    /// Build the transport from the mail relay settings.
    ///
    /// The sender address doubles as the SMTP username; credentials are only
    /// sent when a password is configured.
    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let from: Mailbox = config.smtp_mail.parse()?;

        let mut builder = if config.smtp_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };
        builder = builder.port(config.smtp_port);

        if let Some(pass) = &config.smtp_pass {
            builder = builder.credentials(Credentials::new(config.smtp_mail.clone(), pass.clone()));
        }

        info!(
            smtp_host = %config.smtp_host,
            smtp_port = config.smtp_port,
            starttls = config.smtp_starttls,
            authenticated = config.smtp_pass.is_some(),
            "smtp_transport_configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
            subject_prefix: config.mail_subject_prefix.clone(),
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), MailError> {
        let subject = format!("{}{}", self.subject_prefix, subject);
        let message = build_message(&self.from, to, &subject, html_body)?;

        self.transport.send(message).await?;

        info!(recipients = to.len(), subject = %subject, "smtp_mail_sent");
        Ok(())
    }
}

/// Assemble an HTML message with one `To` entry per recipient.
pub fn build_message(
    from: &Mailbox,
    to: &[String],
    subject: &str,
    html_body: &str,
) -> Result<Message, MailError> {
    if to.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let mut builder = Message::builder().from(from.clone()).subject(subject);
    for address in to {
        builder = builder.to(address.parse::<Mailbox>()?);
    }

    builder
        .header(ContentType::TEXT_HTML)
        .body(html_body.to_string())
        .map_err(|e| MailError::Build(e.to_string()))
}
