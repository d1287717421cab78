use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tidings_alert::search::elastic::ElasticSearchProvider;
use tidings_alert::{AlertChecker, SearchProvider};
use tidings_common::clock::SystemClock;
use tidings_notify::channels::log::LogMailer;
use tidings_notify::channels::smtp::SmtpMailer;
use tidings_notify::manager::NotificationManager;
use tidings_notify::Mailer;
use tidings_storage::AlertStore;

use crate::config::ServerConfig;

pub async fn connect_store(config: &ServerConfig) -> Result<Arc<AlertStore>> {
    let db_url = config.database.connection_url();
    let store = AlertStore::connect(&db_url, Path::new(&config.database.data_dir))
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to open database '{}': {}",
                config.database.redacted_url(),
                e
            )
        })?;
    Ok(Arc::new(store))
}

pub fn build_mailer(config: &ServerConfig) -> Result<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp)?;
            tracing::info!(host = %smtp.host, port = smtp.port, "SMTP mailer configured");
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::warn!("No [smtp] section, notification emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

pub fn build_search(config: &ServerConfig) -> Result<Arc<dyn SearchProvider>> {
    let timeout = Duration::from_secs(config.check.search_timeout_secs);
    let provider = ElasticSearchProvider::new(config.search.clone(), timeout)?;
    tracing::info!(
        url = %config.search.url,
        index = %config.search.index,
        "Search provider configured"
    );
    Ok(Arc::new(provider))
}

/// Wires the production checker: configured store, Elasticsearch, mailer
/// and the system clock.
pub fn build_checker(
    config: &ServerConfig,
    store: Arc<AlertStore>,
    search: Arc<dyn SearchProvider>,
    mailer: Arc<dyn Mailer>,
) -> AlertChecker {
    AlertChecker::new(
        store,
        search,
        Arc::new(NotificationManager::new(mailer)),
        Arc::new(SystemClock),
        config.check.options(),
    )
}
