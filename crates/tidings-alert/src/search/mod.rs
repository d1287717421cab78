pub mod elastic;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tidings_common::types::{MatchRef, Query};

/// One bounded lookup: results created in `(since, until]`.
///
/// `since == None` means the alert was never notified, so every match up to
/// `until` counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: Query,
    pub since: Option<DateTime<Utc>>,
    pub until: DateTime<Utc>,
    pub limit: usize,
}

impl SearchRequest {
    /// Whether a result created at `at` falls inside the window.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use tidings_alert::SearchRequest;
    /// use tidings_common::types::Query;
    ///
    /// let now = Utc::now();
    /// let since = now - Duration::hours(1);
    /// let req = SearchRequest { query: Query::text("fruit"), since: Some(since), until: now, limit: 10 };
    /// assert!(!req.in_window(since));
    /// assert!(req.in_window(now));
    /// assert!(!req.in_window(now + Duration::seconds(1)));
    /// ```
    pub fn in_window(&self, at: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| at > since) && at <= self.until
    }
}

/// Hits ordered by relevance/recency, capped at the request limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// Total matches in the window, which can exceed `hits.len()`.
    pub total: u64,
    pub hits: Vec<MatchRef>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search: query timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected the query itself; retrying will not help.
    #[error("Search: invalid query: {0}")]
    InvalidQuery(String),

    #[error("Search: provider unavailable (status={status}): {body}")]
    Unavailable { status: u16, body: String },

    #[error("Search: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search: malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Search: {0}")]
    Other(String),
}

/// Resolves an alert query to matching results.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn resolve(&self, request: &SearchRequest) -> Result<SearchResults, SearchError>;

    /// Provider name for logs (e.g., `"elasticsearch"`).
    fn provider_name(&self) -> &str;
}
