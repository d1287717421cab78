use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Search criteria saved by an alert.
///
/// Serialized with an explicit `kind` tag so stored alerts keep decoding as
/// new query shapes are added.
///
/// # Examples
///
/// ```
/// use tidings_common::types::Query;
///
/// let q = Query::text("fruit");
/// assert_eq!(q.to_string(), "fruit");
/// assert_eq!(
///     q.canonical_json().unwrap(),
///     r#"{"kind":"text","text":"fruit"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// Free text; every term has to match.
    Text { text: String },
    /// Exact-match field filters, optionally narrowed by free text.
    Filter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default)]
        filters: BTreeMap<String, String>,
    },
}

impl Query {
    pub fn text(text: impl Into<String>) -> Self {
        Query::Text { text: text.into() }
    }

    /// The free-text part of the query, if any (trimmed, never empty).
    pub fn free_text(&self) -> Option<&str> {
        let text = match self {
            Query::Text { text } => Some(text.as_str()),
            Query::Filter { text, .. } => text.as_deref(),
        };
        text.map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn filters(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Query::Text { .. } => None,
            Query::Filter { filters, .. } => Some(filters),
        }
    }

    /// A query with neither text nor filters would match everything.
    pub fn is_empty(&self) -> bool {
        self.free_text().is_none() && self.filters().map_or(true, BTreeMap::is_empty)
    }

    /// Stable JSON form. Filters live in a `BTreeMap`, so two equal queries
    /// always produce the same string; duplicate detection relies on this.
    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Text { text } => write!(f, "{}", text.trim()),
            Query::Filter { text, filters } => {
                let mut parts: Vec<String> = Vec::with_capacity(filters.len() + 1);
                if let Some(t) = text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                    parts.push(t.to_string());
                }
                parts.extend(filters.iter().map(|(k, v)| format!("{k}:{v}")));
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

/// A user or group account. Alerts and notifications belong to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    /// `None` means the role opted out of email delivery.
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Deliverable address, treating blank strings like a missing email.
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// A saved search owned by a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub owner_id: String,
    pub query: Query,
    /// Last time a notification was emitted; `None` if never.
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// An alert whose cursor is at or past `now` is snoozed and must not be
    /// checked. Including the equality case keeps every advance of
    /// `notified_at` strictly increasing.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use tidings_common::types::{Alert, Query};
    ///
    /// let now = Utc::now();
    /// let mut alert = Alert {
    ///     id: "1".into(),
    ///     owner_id: "r1".into(),
    ///     query: Query::text("fruit"),
    ///     notified_at: None,
    ///     created_at: now,
    ///     updated_at: now,
    /// };
    /// assert!(!alert.is_snoozed(now));
    /// alert.notified_at = Some(now + Duration::hours(72));
    /// assert!(alert.is_snoozed(now));
    /// ```
    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.notified_at.is_some_and(|at| at >= now)
    }
}

/// Snapshot of one search hit, embedded in a notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// What a notification points at: the alert, the query as it was when the
/// match happened, and the batch of matched results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub alert_id: String,
    pub query: Query,
    pub matches: Vec<MatchRef>,
    /// Hits reported for the window; may exceed `matches.len()` when the
    /// provider result was capped.
    pub total: u64,
}

/// An emitted alert-match event. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub owner_id: String,
    pub alert_id: String,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
}
