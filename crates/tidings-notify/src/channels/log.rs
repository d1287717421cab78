use crate::{EmailMessage, Mailer};
use anyhow::Result;
use async_trait::async_trait;

/// Used when no SMTP relay is configured: every message becomes a log line.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email not sent (no SMTP relay configured)"
        );
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "log"
    }
}
