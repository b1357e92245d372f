//! Mail dispatch - rendering decoded messages and handing them to the mailer.
//!
//! Each dispatch calls the mail sender exactly once. Failures are logged
//! and returned to the caller; nothing here retries.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::html::{TemplateError, TemplateRenderer};
use crate::mail::{MailError, MailSender};
use crate::queue::{DecodedMessage, QueueKind};

/// Subject line of every verification mail.
pub const VERIFICATION_SUBJECT: &str = "Verify your email";

/// Rendering or sending failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("template rendering failed: {0}")]
    Template(#[from] TemplateError),

    #[error("mail delivery failed: {0}")]
    Mail(#[from] MailError),
}

/// Renders templates and sends the result through a [`MailSender`].
pub struct Dispatcher {
    mailer: Arc<dyn MailSender>,
    templates: Arc<dyn TemplateRenderer>,
}

impl Dispatcher {
    pub fn new(mailer: Arc<dyn MailSender>, templates: Arc<dyn TemplateRenderer>) -> Self {
        Self { mailer, templates }
    }

    /// Render and send a decoded message.
    ///
    /// Notifications keep their own subject and render `notification` with
    /// the body; verifications get [`VERIFICATION_SUBJECT`] and render
    /// `verification` with the passcode.
    pub async fn deliver(&self, message: &DecodedMessage) -> Result<(), DispatchError> {
        match message {
            DecodedMessage::Notification(payload) => {
                let body = self.render(QueueKind::Notification, &payload.body).await?;
                self.dispatch(&payload.recipients, &payload.subject, &body)
                    .await
            }
            DecodedMessage::Verification(payload) => {
                let body = self.render(QueueKind::Verification, &payload.passcode).await?;
                let recipients = [payload.recipient.clone()];
                self.dispatch(&recipients, VERIFICATION_SUBJECT, &body).await
            }
        }
    }

    /// Send an already rendered body. Calls the mailer exactly once.
    pub async fn dispatch(
        &self,
        recipients: &[String],
        subject: &str,
        rendered_body: &str,
    ) -> Result<(), DispatchError> {
        match self.mailer.send(recipients, subject, rendered_body).await {
            Ok(()) => {
                info!(
                    recipients = recipients.len(),
                    subject = %subject,
                    "mail_dispatched"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    recipients = ?recipients,
                    subject = %subject,
                    error = %e,
                    "mail_dispatch_failed"
                );
                Err(e.into())
            }
        }
    }

    async fn render(&self, kind: QueueKind, data: &str) -> Result<String, DispatchError> {
        let template = kind.template_name();
        self.templates.render(template, data).await.map_err(|e| {
            error!(template = template, error = %e, "template_render_failed");
            DispatchError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::FileTemplates;
    use crate::queue::{NotificationPayload, VerificationPayload};
    use crate::testing::{EchoTemplates, RecordingMailer, SentMail};

    fn dispatcher(mailer: &RecordingMailer) -> Dispatcher {
        Dispatcher::new(Arc::new(mailer.clone()), Arc::new(EchoTemplates))
    }

    #[tokio::test]
    async fn test_deliver_notification() {
        let mailer = RecordingMailer::new();
        let message = DecodedMessage::Notification(NotificationPayload {
            recipients: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            subject: "Hello".to_string(),
            body: "World".to_string(),
        });

        dispatcher(&mailer).deliver(&message).await.unwrap();

        assert_eq!(
            mailer.sent(),
            vec![SentMail {
                to: vec!["a@x.com".to_string(), "b@x.com".to_string()],
                subject: "Hello".to_string(),
                body: "<notification>World</notification>".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_deliver_verification_uses_fixed_subject() {
        let mailer = RecordingMailer::new();
        let message = DecodedMessage::Verification(VerificationPayload {
            recipient: "b@x.com".to_string(),
            passcode: "000111".to_string(),
        });

        dispatcher(&mailer).deliver(&message).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["b@x.com"]);
        assert_eq!(sent[0].subject, "Verify your email");
        assert_eq!(sent[0].body, "<verification>000111</verification>");
    }

    #[tokio::test]
    async fn test_send_failure_is_returned_once() {
        let mailer = RecordingMailer::failing();

        let result = dispatcher(&mailer)
            .dispatch(&["a@x.com".to_string()], "Subj", "<p>x</p>")
            .await;

        assert!(matches!(result, Err(DispatchError::Mail(_))));
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_template_failure_skips_send() {
        let mailer = RecordingMailer::new();
        let dispatcher = Dispatcher::new(
            Arc::new(mailer.clone()),
            Arc::new(FileTemplates::new("/nonexistent/templates")),
        );
        let message = DecodedMessage::Verification(VerificationPayload {
            recipient: "b@x.com".to_string(),
            passcode: "000111".to_string(),
        });

        let result = dispatcher.deliver(&message).await;

        assert!(matches!(result, Err(DispatchError::Template(_))));
        assert!(mailer.sent().is_empty());
    }
}
