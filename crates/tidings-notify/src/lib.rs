//! Email delivery for alert notifications.
//!
//! Notifications are persisted by the alert check cycle first; this crate
//! only hands them to a [`Mailer`]. Delivery is best-effort: the
//! [`manager::NotificationManager`] logs failures and never reports them as
//! errors to its caller.

pub mod channels;
pub mod error;
pub mod manager;
pub mod render;


use anyhow::Result;
use async_trait::async_trait;

/// A rendered plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// An email transport (SMTP relay, log sink, in-memory outbox).
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers the message.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send(&self, message: &EmailMessage) -> Result<()>;

    /// Returns the transport name (e.g., `"smtp"`, `"log"`).
    fn transport_name(&self) -> &str;
}
