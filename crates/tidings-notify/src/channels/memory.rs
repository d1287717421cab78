use crate::{EmailMessage, Mailer};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;

/// Keeps every sent message in memory. Handy for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<EmailMessage>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything sent so far.
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }

    fn transport_name(&self) -> &str {
        "memory"
    }
}
