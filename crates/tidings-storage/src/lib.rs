//! Persistence for roles, saved-search alerts and the notifications they emit.
//!
//! [`store::AlertStore`] is backed by SeaORM (SQLite by default, any SeaORM
//! backend by URL) and applies the embedded `migration` schema on connect.
//! The alert check engine talks to storage only through [`AlertRepository`].

pub mod entities;
pub mod error;
pub mod store;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidings_common::types::{Alert, Notification, NotificationPayload, Role};

pub use error::{Result, StorageError};
pub use store::AlertStore;

/// Outcome of [`AlertRepository::record_match`].
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRecord {
    /// The notification was inserted and the alert cursor advanced, atomically.
    Recorded(Notification),
    /// The alert's `notified_at` no longer equals the value the caller read,
    /// so another check already handled this window. Nothing was written.
    Conflict {
        notified_at: Option<DateTime<Utc>>,
    },
    /// The alert was deleted (or never existed). Nothing was written.
    Gone,
}

/// The subset of storage the alert check cycle depends on.
///
/// Implementations must be safe to share across tasks (`Send + Sync`)
/// because alerts are checked concurrently.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Soft-deletes alerts that repeat an older alert of the same owner with
    /// an identical query. Returns the number of alerts removed.
    async fn dedupe_alerts(&self) -> Result<u64>;

    /// Ids of every live (not deleted) alert.
    async fn list_alert_ids(&self) -> Result<Vec<String>>;

    async fn get_alert(&self, id: &str) -> Result<Option<Alert>>;

    async fn get_role(&self, id: &str) -> Result<Option<Role>>;

    /// Inserts a notification for `alert_id` and sets its `notified_at` to
    /// `at` in one transaction, provided the stored `notified_at` still
    /// equals `expected_notified_at`.
    async fn record_match(
        &self,
        alert_id: &str,
        expected_notified_at: Option<DateTime<Utc>>,
        payload: &NotificationPayload,
        at: DateTime<Utc>,
    ) -> Result<MatchRecord>;
}
