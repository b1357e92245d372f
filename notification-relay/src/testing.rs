//! Test doubles for the mail and template capabilities.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::html::{TemplateError, TemplateRenderer};
use crate::mail::{MailError, MailSender};

/// One call to [`MailSender::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Records every send; optionally fails them all.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` sends were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<SentMail> {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for mail")
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, to: &[String], subject: &str, html_body: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_vec(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });

        if self.fail {
            return Err(MailError::Build("relay refused".to_string()));
        }
        Ok(())
    }
}

/// Renders `<name>data</name>` without touching the filesystem.
pub struct EchoTemplates;

#[async_trait]
impl TemplateRenderer for EchoTemplates {
    async fn render(&self, name: &str, data: &str) -> Result<String, TemplateError> {
        Ok(format!("<{name}>{data}</{name}>"))
    }
}
