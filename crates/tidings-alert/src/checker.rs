use crate::search::{SearchError, SearchProvider, SearchRequest};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tidings_common::clock::Clock;
use tidings_common::types::NotificationPayload;
use tidings_notify::manager::{DeliveryOutcome, NotificationManager};
use tidings_storage::{AlertRepository, MatchRecord};
use tokio::sync::Semaphore;

/// Tunables for one check cycle.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Upper bound for a single alert's search call.
    pub search_timeout: Duration,
    pub max_concurrent: usize,
    /// Matches kept per notification; the payload still carries the full total.
    pub max_results: usize,
    /// Soft-delete duplicate alerts before checking.
    pub dedupe: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(30),
            max_concurrent: 4,
            max_results: 50,
            dedupe: true,
        }
    }
}

/// Result of checking a single alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Notified {
        notification_id: String,
        matches: usize,
        total: u64,
        delivery: DeliveryOutcome,
    },
    NoNewResults,
    /// `notified_at` is at or past the current time.
    Snoozed,
    /// Nothing to do: the alert vanished, its owner is missing, or its
    /// query would match everything.
    Skipped(String),
    /// Another check advanced the cursor first; nothing was written.
    Conflict,
    Failed(String),
}

/// Counters for one cycle, logged at the end and returned to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub checked: usize,
    pub notified: usize,
    pub empty: usize,
    pub snoozed: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub deduped: u64,
}

impl CheckSummary {
    pub fn record(&mut self, outcome: &AlertOutcome) {
        self.checked += 1;
        match outcome {
            AlertOutcome::Notified { delivery, .. } => {
                self.notified += 1;
                match delivery {
                    DeliveryOutcome::Sent => self.emails_sent += 1,
                    DeliveryOutcome::Failed(_) => self.emails_failed += 1,
                    DeliveryOutcome::SkippedNoEmail => {}
                }
            }
            AlertOutcome::NoNewResults => self.empty += 1,
            AlertOutcome::Snoozed => self.snoozed += 1,
            AlertOutcome::Skipped(_) => self.skipped += 1,
            AlertOutcome::Conflict => self.conflicts += 1,
            AlertOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Runs alert check cycles against a repository, a search backend and a
/// mailer. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct AlertChecker {
    repo: Arc<dyn AlertRepository>,
    search: Arc<dyn SearchProvider>,
    notifier: Arc<NotificationManager>,
    clock: Arc<dyn Clock>,
    options: CheckOptions,
}

impl AlertChecker {
    pub fn new(
        repo: Arc<dyn AlertRepository>,
        search: Arc<dyn SearchProvider>,
        notifier: Arc<NotificationManager>,
        clock: Arc<dyn Clock>,
        options: CheckOptions,
    ) -> Self {
        Self {
            repo,
            search,
            notifier,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Checks every live alert once.
    ///
    /// A failing alert is logged and counted; it never stops the others.
    /// Only failing to list alerts at all is an error.
    pub async fn check_alerts(&self) -> Result<CheckSummary> {
        let mut summary = CheckSummary::default();

        if self.options.dedupe {
            match self.repo.dedupe_alerts().await {
                Ok(n) => summary.deduped = n,
                Err(e) => tracing::error!(error = %e, "Failed to dedupe alerts"),
            }
        }

        let ids = self.repo.list_alert_ids().await?;
        if ids.is_empty() {
            tracing::debug!("No alerts to check");
            return Ok(summary);
        }

        tracing::info!(
            count = ids.len(),
            provider = self.search.provider_name(),
            "Checking alerts"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(ids.len());

        for id in ids {
            let permit = semaphore.clone().acquire_owned().await?;
            let checker = self.clone();
            let handle = tokio::spawn(async move {
                let outcome = checker.check_alert(&id).await;
                drop(permit);
                (id, outcome)
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok((_, outcome)) => summary.record(&outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Alert check task panicked");
                    summary.record(&AlertOutcome::Failed(e.to_string()));
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            notified = summary.notified,
            empty = summary.empty,
            snoozed = summary.snoozed,
            failed = summary.failed,
            emails_sent = summary.emails_sent,
            "Alert check cycle finished"
        );
        Ok(summary)
    }

    /// Checks one alert: search the window since its last notification and,
    /// if anything matched, record one notification and email the owner.
    pub async fn check_alert(&self, alert_id: &str) -> AlertOutcome {
        let outcome = self.check_alert_inner(alert_id).await;
        match &outcome {
            AlertOutcome::Failed(reason) => {
                tracing::error!(alert_id, error = %reason, "Alert check failed");
            }
            AlertOutcome::Skipped(reason) => {
                tracing::debug!(alert_id, reason = %reason, "Alert skipped");
            }
            _ => {}
        }
        outcome
    }

    async fn check_alert_inner(&self, alert_id: &str) -> AlertOutcome {
        let alert = match self.repo.get_alert(alert_id).await {
            Ok(Some(alert)) => alert,
            Ok(None) => return AlertOutcome::Skipped("alert not found".into()),
            Err(e) => return AlertOutcome::Failed(format!("load alert: {e}")),
        };

        if alert.query.is_empty() {
            return AlertOutcome::Skipped("empty query".into());
        }

        // Captured before searching so results indexed during the search
        // fall into the next window rather than being skipped.
        let now = self.clock.now();
        if alert.is_snoozed(now) {
            tracing::debug!(alert_id, notified_at = ?alert.notified_at, "Alert snoozed");
            return AlertOutcome::Snoozed;
        }

        let owner = match self.repo.get_role(&alert.owner_id).await {
            Ok(Some(role)) => role,
            Ok(None) => return AlertOutcome::Skipped(format!("owner {} missing", alert.owner_id)),
            Err(e) => return AlertOutcome::Failed(format!("load owner: {e}")),
        };

        let request = SearchRequest {
            query: alert.query.clone(),
            since: alert.notified_at,
            until: now,
            limit: self.options.max_results,
        };

        let timeout = self.options.search_timeout;
        let results = match tokio::time::timeout(timeout, self.search.resolve(&request)).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => return AlertOutcome::Failed(e.to_string()),
            Err(_) => return AlertOutcome::Failed(SearchError::Timeout(timeout).to_string()),
        };

        if results.hits.is_empty() {
            tracing::debug!(alert_id, query = %alert.query, "No new results");
            return AlertOutcome::NoNewResults;
        }

        let mut hits = results.hits;
        let listed = hits.len() as u64;
        hits.truncate(self.options.max_results);
        let payload = NotificationPayload {
            alert_id: alert.id.clone(),
            query: alert.query.clone(),
            total: results.total.max(listed),
            matches: hits,
        };

        let notification = match self
            .repo
            .record_match(&alert.id, alert.notified_at, &payload, now)
            .await
        {
            Ok(MatchRecord::Recorded(n)) => n,
            Ok(MatchRecord::Conflict { notified_at }) => {
                tracing::warn!(
                    alert_id,
                    expected = ?alert.notified_at,
                    actual = ?notified_at,
                    "Alert cursor moved during check, dropping results"
                );
                return AlertOutcome::Conflict;
            }
            Ok(MatchRecord::Gone) => return AlertOutcome::Skipped("alert deleted during check".into()),
            Err(e) => return AlertOutcome::Failed(format!("record notification: {e}")),
        };

        tracing::info!(
            alert_id,
            owner_id = %owner.id,
            notification_id = %notification.id,
            matches = notification.payload.matches.len(),
            total = notification.payload.total,
            "Alert notification recorded"
        );

        let delivery = self.notifier.deliver(&owner, &notification).await;

        AlertOutcome::Notified {
            matches: notification.payload.matches.len(),
            total: notification.payload.total,
            notification_id: notification.id,
            delivery,
        }
    }
}
