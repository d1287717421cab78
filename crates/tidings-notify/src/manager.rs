use crate::{render, Mailer};
use std::sync::Arc;
use tidings_common::types::{Notification, Role};

/// What happened to the email side of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// The owner has no email address; the notification stays recorded only.
    SkippedNoEmail,
    Failed(String),
}

pub struct NotificationManager {
    mailer: Arc<dyn Mailer>,
}

impl NotificationManager {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Emails `notification` to its owner. Never fails: transport errors are
    /// logged and returned as [`DeliveryOutcome::Failed`].
    pub async fn deliver(&self, owner: &Role, notification: &Notification) -> DeliveryOutcome {
        let Some(to) = owner.email() else {
            tracing::debug!(
                owner_id = %owner.id,
                notification_id = %notification.id,
                "Owner has no email, skipping delivery"
            );
            return DeliveryOutcome::SkippedNoEmail;
        };

        let message = render::email(to, notification);
        match self.mailer.send(&message).await {
            Ok(()) => {
                tracing::info!(
                    transport = self.mailer.transport_name(),
                    owner_id = %owner.id,
                    notification_id = %notification.id,
                    "Notification email sent"
                );
                DeliveryOutcome::Sent
            }
            Err(e) => {
                tracing::error!(
                    transport = self.mailer.transport_name(),
                    owner_id = %owner.id,
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to send notification email"
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }
}
