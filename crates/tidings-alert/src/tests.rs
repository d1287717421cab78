use crate::checker::{AlertChecker, AlertOutcome, CheckOptions};
use crate::search::memory::{Document, MemorySearchProvider};
use crate::search::{SearchError, SearchProvider, SearchRequest, SearchResults};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tidings_common::clock::ManualClock;
use tidings_common::types::{Alert, NotificationPayload, Query, Role};
use tidings_notify::channels::memory::MemoryMailer;
use tidings_notify::manager::{DeliveryOutcome, NotificationManager};
use tidings_notify::{EmailMessage, Mailer};
use tidings_storage::store::NotificationFilter;
use tidings_storage::{AlertRepository, AlertStore, MatchRecord, StorageError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

struct Harness {
    _dir: TempDir,
    store: Arc<AlertStore>,
    search: Arc<MemorySearchProvider>,
    mailer: Arc<MemoryMailer>,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new() -> Self {
        tidings_common::id::init(1, 1);
        let dir = TempDir::new().unwrap();
        let url = AlertStore::sqlite_url(dir.path());
        let store = AlertStore::connect(&url, dir.path()).await.unwrap();

        let search = MemorySearchProvider::new();
        search.index(Document::new("doc-1", "Banana fruit exports", t0() - Duration::hours(1)));
        search.index(Document::new(
            "doc-2",
            "KwaZulu-Natal provincial budget",
            t0() - Duration::hours(2),
        ));
        search.index(
            Document::new("doc-3", "kwazulu Ltd registered", t0() - Duration::hours(3))
                .with_title("KwaZulu Ltd")
                .with_field("schema", "Company"),
        );

        Self {
            _dir: dir,
            store: Arc::new(store),
            search: Arc::new(search),
            mailer: Arc::new(MemoryMailer::new()),
            clock: Arc::new(ManualClock::new(t0())),
        }
    }

    fn checker(&self) -> AlertChecker {
        self.checker_with(self.store.clone(), self.search.clone(), self.mailer.clone())
    }

    fn checker_with(
        &self,
        repo: Arc<dyn AlertRepository>,
        search: Arc<dyn SearchProvider>,
        mailer: Arc<dyn Mailer>,
    ) -> AlertChecker {
        AlertChecker::new(
            repo,
            search,
            Arc::new(NotificationManager::new(mailer)),
            self.clock.clone(),
            CheckOptions {
                search_timeout: std::time::Duration::from_millis(200),
                ..CheckOptions::default()
            },
        )
    }

    async fn alert(&self, owner: &Role, query: &str, notified_at: Option<DateTime<Utc>>) -> Alert {
        let alert = self
            .store
            .create_alert(&owner.id, &Query::text(query))
            .await
            .unwrap();
        self.store
            .set_notified_at(&alert.id, notified_at)
            .await
            .unwrap()
            .unwrap()
    }

    async fn notifications(&self) -> u64 {
        self.store
            .count_notifications(&NotificationFilter::default())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn notifies_once_for_matches_since_last_notification() {
    let h = Harness::new().await;
    let owner = h.store.create_role("with_email", Some("test@example.org")).await.unwrap();
    let alert = h.alert(&owner, "fruit", Some(t0() - Duration::hours(72))).await;

    let summary = h.checker().check_alerts().await.unwrap();
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.emails_sent, 1);

    let listed = h
        .store
        .list_notifications(&NotificationFilter::owner(&owner.id), 10, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].alert_id, alert.id);
    assert_eq!(listed[0].payload.matches[0].id, "doc-1");

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "test@example.org");
}

#[tokio::test]
async fn future_notified_at_suppresses_the_alert() {
    let h = Harness::new().await;
    let owner = h.store.create_role("with_email", Some("test@example.org")).await.unwrap();
    h.alert(&owner, "fruit", Some(t0() + Duration::hours(72))).await;

    let summary = h.checker().check_alerts().await.unwrap();
    assert_eq!(summary.snoozed, 1);
    assert_eq!(h.notifications().await, 0);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn immediate_rerun_emits_nothing() {
    let h = Harness::new().await;
    let owner = h.store.create_role("with_email", Some("test@example.org")).await.unwrap();
    h.alert(&owner, "fruit", Some(t0() - Duration::hours(72))).await;
    h.alert(&owner, "kwazulu", None).await;
    let checker = h.checker();

    checker.check_alerts().await.unwrap();
    assert_eq!(h.notifications().await, 2);

    // same instant: cursor equals now
    let summary = checker.check_alerts().await.unwrap();
    assert_eq!(summary.notified, 0);
    assert_eq!(summary.snoozed, 2);

    // later, but nothing new was indexed
    h.clock.advance(Duration::minutes(5));
    let summary = checker.check_alerts().await.unwrap();
    assert_eq!(summary.notified, 0);
    assert_eq!(summary.empty, 2);
    assert_eq!(h.notifications().await, 2);
    assert_eq!(h.mailer.sent().len(), 2);
}

#[tokio::test]
async fn new_activity_after_a_cycle_notifies_again() {
    let h = Harness::new().await;
    let owner = h.store.create_role("with_email", Some("test@example.org")).await.unwrap();
    let alert = h.alert(&owner, "fruit", None).await;
    let checker = h.checker();
    checker.check_alerts().await.unwrap();

    h.clock.advance(Duration::hours(1));
    h.search.index(Document::new("doc-9", "more fruit", t0() + Duration::minutes(30)));

    match checker.check_alert(&alert.id).await {
        AlertOutcome::Notified { matches, total, .. } => {
            assert_eq!(matches, 1);
            assert_eq!(total, 1);
        }
        other => panic!("expected a notification, got {other:?}"),
    }
    assert_eq!(h.notifications().await, 2);
}

#[tokio::test]
async fn distinct_alerts_each_get_a_notification() {
    let h = Harness::new().await;
    let owner = h.store.create_role("with_email", Some("test@example.org")).await.unwrap();
    let fruit = h.alert(&owner, "fruit", Some(t0() - Duration::hours(72))).await;
    let kwazulu = h.alert(&owner, "kwazulu", Some(t0() - Duration::hours(72))).await;

    let summary = h.checker().check_alerts().await.unwrap();
    assert_eq!(summary.notified, 2);
    assert_eq!(h.notifications().await, 2);

    for alert in [&fruit, &kwazulu] {
        let filter = NotificationFilter {
            owner_id: None,
            alert_id: Some(alert.id.clone()),
        };
        assert_eq!(h.store.count_notifications(&filter).await.unwrap(), 1);
    }

    // both kwazulu documents land in a single notification
    let filter = NotificationFilter {
        owner_id: None,
        alert_id: Some(kwazulu.id.clone()),
    };
    let listed = h.store.list_notifications(&filter, 10, 0).await.unwrap();
    assert_eq!(listed[0].payload.total, 2);
    assert_eq!(listed[0].payload.matches[0].id, "doc-2");
}

#[tokio::test]
async fn owner_without_email_still_gets_a_record() {
    let h = Harness::new().await;
    let owner = h.store.create_role("without_email", None).await.unwrap();
    let alert = h.alert(&owner, "fruit", Some(t0() - Duration::hours(72))).await;

    match h.checker().check_alert(&alert.id).await {
        AlertOutcome::Notified { delivery, .. } => {
            assert_eq!(delivery, DeliveryOutcome::SkippedNoEmail)
        }
        other => panic!("expected a notification, got {other:?}"),
    }
    assert_eq!(h.notifications().await, 1);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn notified_at_strictly_increases_and_never_passes_now() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    let before = t0() - Duration::hours(72);
    let alert = h.alert(&owner, "fruit", Some(before)).await;
    let checker = h.checker();

    checker.check_alerts().await.unwrap();
    let first = h.store.get_alert(&alert.id).await.unwrap().unwrap().notified_at.unwrap();
    assert!(first > before);
    assert!(first <= t0());

    h.clock.advance(Duration::seconds(1));
    h.search.index(Document::new("doc-10", "fruit again", t0() + Duration::seconds(1)));
    checker.check_alerts().await.unwrap();
    let second = h.store.get_alert(&alert.id).await.unwrap().unwrap().notified_at.unwrap();
    assert!(second > first);
    assert!(second <= t0() + Duration::seconds(1));
}

#[tokio::test]
async fn never_notified_alert_matches_history() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    let alert = h.alert(&owner, "kwazulu", None).await;

    match h.checker().check_alert(&alert.id).await {
        AlertOutcome::Notified { matches, .. } => assert_eq!(matches, 2),
        other => panic!("expected a notification, got {other:?}"),
    }
}

#[tokio::test]
async fn results_are_capped_but_total_is_kept() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    let alert = h.alert(&owner, "kwazulu", None).await;
    let checker = AlertChecker::new(
        h.store.clone(),
        h.search.clone(),
        Arc::new(NotificationManager::new(h.mailer.clone())),
        h.clock.clone(),
        CheckOptions {
            max_results: 1,
            ..CheckOptions::default()
        },
    );

    match checker.check_alert(&alert.id).await {
        AlertOutcome::Notified { matches, total, .. } => {
            assert_eq!(matches, 1);
            assert_eq!(total, 2);
        }
        other => panic!("expected a notification, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_query_is_skipped() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    let alert = h.alert(&owner, "   ", None).await;

    assert!(matches!(
        h.checker().check_alert(&alert.id).await,
        AlertOutcome::Skipped(_)
    ));
    assert_eq!(h.notifications().await, 0);
}

#[tokio::test]
async fn deleted_and_duplicate_alerts_are_not_checked() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    h.alert(&owner, "fruit", None).await;
    h.alert(&owner, "fruit", None).await;
    let gone = h.alert(&owner, "kwazulu", None).await;
    h.store.delete_alert(&gone.id).await.unwrap();

    let summary = h.checker().check_alerts().await.unwrap();
    assert_eq!(summary.deduped, 1);
    assert_eq!(summary.checked, 1);
    assert_eq!(h.notifications().await, 1);

    assert!(matches!(
        h.checker().check_alert(&gone.id).await,
        AlertOutcome::Skipped(_)
    ));
}

/// Fails for one query, delegates everything else.
struct FlakySearch {
    inner: Arc<MemorySearchProvider>,
    failing: &'static str,
    hang: bool,
}

#[async_trait]
impl SearchProvider for FlakySearch {
    async fn resolve(&self, request: &SearchRequest) -> Result<SearchResults, SearchError> {
        if request.query.free_text() == Some(self.failing) {
            if self.hang {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            }
            return Err(SearchError::Unavailable {
                status: 503,
                body: "shard failure".into(),
            });
        }
        self.inner.resolve(request).await
    }

    fn provider_name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn search_failure_is_isolated_to_its_alert() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", Some("test@example.org")).await.unwrap();
    let broken = h.alert(&owner, "fruit", None).await;
    h.alert(&owner, "kwazulu", None).await;

    let search = Arc::new(FlakySearch {
        inner: h.search.clone(),
        failing: "fruit",
        hang: false,
    });
    let summary = h
        .checker_with(h.store.clone(), search, h.mailer.clone())
        .check_alerts()
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.notified, 1);

    // failed alert keeps its cursor so the next cycle retries the window
    let broken = h.store.get_alert(&broken.id).await.unwrap().unwrap();
    assert_eq!(broken.notified_at, None);
}

#[tokio::test]
async fn slow_search_times_out() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    let alert = h.alert(&owner, "fruit", None).await;

    let search = Arc::new(FlakySearch {
        inner: h.search.clone(),
        failing: "fruit",
        hang: true,
    });
    let outcome = h
        .checker_with(h.store.clone(), search, h.mailer.clone())
        .check_alert(&alert.id)
        .await;
    match outcome {
        AlertOutcome::Failed(msg) => assert!(msg.contains("timed out"), "{msg}"),
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(h.notifications().await, 0);
}

/// Delegates to the store but refuses to record matches for one alert.
struct BrokenWrites {
    store: Arc<AlertStore>,
    failing_alert: String,
}

#[async_trait]
impl AlertRepository for BrokenWrites {
    async fn dedupe_alerts(&self) -> tidings_storage::Result<u64> {
        self.store.dedupe_alerts().await
    }

    async fn list_alert_ids(&self) -> tidings_storage::Result<Vec<String>> {
        self.store.list_alert_ids().await
    }

    async fn get_alert(&self, id: &str) -> tidings_storage::Result<Option<Alert>> {
        self.store.get_alert(id).await
    }

    async fn get_role(&self, id: &str) -> tidings_storage::Result<Option<Role>> {
        self.store.get_role(id).await
    }

    async fn record_match(
        &self,
        alert_id: &str,
        expected_notified_at: Option<DateTime<Utc>>,
        payload: &NotificationPayload,
        at: DateTime<Utc>,
    ) -> tidings_storage::Result<MatchRecord> {
        if alert_id == self.failing_alert {
            return Err(StorageError::Other("disk I/O error".into()));
        }
        self.store
            .record_match(alert_id, expected_notified_at, payload, at)
            .await
    }
}

#[tokio::test]
async fn persistence_failure_is_isolated_to_its_alert() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", Some("test@example.org")).await.unwrap();
    let broken = h.alert(&owner, "fruit", None).await;
    let healthy = h.alert(&owner, "kwazulu", None).await;

    let repo = Arc::new(BrokenWrites {
        store: h.store.clone(),
        failing_alert: broken.id.clone(),
    });
    let summary = h
        .checker_with(repo, h.search.clone(), h.mailer.clone())
        .check_alerts()
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.notified, 1);

    let broken = h.store.get_alert(&broken.id).await.unwrap().unwrap();
    assert_eq!(broken.notified_at, None);
    let healthy = h.store.get_alert(&healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.notified_at, Some(t0()));
    // no email for the alert whose notification was not stored
    assert_eq!(h.mailer.sent().len(), 1);
}

struct RefusingMailer;

#[async_trait]
impl Mailer for RefusingMailer {
    async fn send(&self, _message: &EmailMessage) -> anyhow::Result<()> {
        anyhow::bail!("550 mailbox unavailable")
    }

    fn transport_name(&self) -> &str {
        "refusing"
    }
}

#[tokio::test]
async fn email_failure_keeps_the_notification() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", Some("test@example.org")).await.unwrap();
    let alert = h.alert(&owner, "fruit", None).await;

    let summary = h
        .checker_with(h.store.clone(), h.search.clone(), Arc::new(RefusingMailer))
        .check_alerts()
        .await
        .unwrap();
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.emails_failed, 1);
    assert_eq!(h.notifications().await, 1);

    let alert = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(alert.notified_at, Some(t0()));
}

/// Moves the stored cursor right after the checker reads the alert, as a
/// concurrent checker would.
struct RacingRepo {
    store: Arc<AlertStore>,
    moved_to: DateTime<Utc>,
}

#[async_trait]
impl AlertRepository for RacingRepo {
    async fn dedupe_alerts(&self) -> tidings_storage::Result<u64> {
        Ok(0)
    }

    async fn list_alert_ids(&self) -> tidings_storage::Result<Vec<String>> {
        self.store.list_alert_ids().await
    }

    async fn get_alert(&self, id: &str) -> tidings_storage::Result<Option<Alert>> {
        let alert = self.store.get_alert(id).await?;
        self.store.set_notified_at(id, Some(self.moved_to)).await?;
        Ok(alert)
    }

    async fn get_role(&self, id: &str) -> tidings_storage::Result<Option<Role>> {
        self.store.get_role(id).await
    }

    async fn record_match(
        &self,
        alert_id: &str,
        expected_notified_at: Option<DateTime<Utc>>,
        payload: &NotificationPayload,
        at: DateTime<Utc>,
    ) -> tidings_storage::Result<MatchRecord> {
        self.store
            .record_match(alert_id, expected_notified_at, payload, at)
            .await
    }
}

#[tokio::test]
async fn moved_cursor_is_a_conflict_and_writes_nothing() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", Some("test@example.org")).await.unwrap();
    let alert = h.alert(&owner, "fruit", None).await;
    let moved_to = t0() - Duration::minutes(1);

    let repo = Arc::new(RacingRepo {
        store: h.store.clone(),
        moved_to,
    });
    let outcome = h
        .checker_with(repo, h.search.clone(), h.mailer.clone())
        .check_alert(&alert.id)
        .await;
    assert_eq!(outcome, AlertOutcome::Conflict);
    assert_eq!(h.notifications().await, 0);
    assert!(h.mailer.sent().is_empty());

    let alert = h.store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(alert.notified_at, Some(moved_to));
}

#[tokio::test]
async fn concurrent_cycles_notify_each_alert_once() {
    let h = Harness::new().await;
    let owner = h.store.create_role("owner", None).await.unwrap();
    h.alert(&owner, "fruit", None).await;
    h.alert(&owner, "kwazulu", None).await;

    let (first, second) = (h.checker(), h.checker());
    let (a, b) = tokio::join!(first.check_alerts(), second.check_alerts());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.notified + b.notified, 2);
    assert_eq!(h.notifications().await, 2);
}
