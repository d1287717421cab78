#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use tidings_alert::search::memory::MemorySearchProvider;
use tidings_alert::AlertChecker;
use tidings_common::clock::ManualClock;
use tidings_notify::channels::memory::MemoryMailer;
use tidings_notify::manager::NotificationManager;
use tidings_server::app;
use tidings_server::config::ServerConfig;
use tidings_storage::AlertStore;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub config: ServerConfig,
    pub store: Arc<AlertStore>,
    pub search: Arc<MemorySearchProvider>,
    pub mailer: Arc<MemoryMailer>,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub async fn build_test_context() -> Result<TestContext> {
    tidings_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let mut config = ServerConfig::parse("[check]\nsearch_timeout_secs = 5\n")?;
    config.database.data_dir = temp_dir.path().to_string_lossy().to_string();

    let store = app::connect_store(&config).await?;

    Ok(TestContext {
        temp_dir,
        config,
        store,
        search: Arc::new(MemorySearchProvider::new()),
        mailer: Arc::new(MemoryMailer::new()),
        clock: Arc::new(ManualClock::new(start_time())),
    })
}

impl TestContext {
    pub fn checker(&self) -> AlertChecker {
        AlertChecker::new(
            self.store.clone(),
            self.search.clone(),
            Arc::new(NotificationManager::new(self.mailer.clone())),
            self.clock.clone(),
            self.config.check.options(),
        )
    }
}
