use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tidings_alert::search::elastic::ElasticConfig;
use tidings_alert::CheckOptions;
use tidings_notify::channels::smtp::SmtpConfig;
use tidings_storage::store::redact_url;
use tidings_storage::AlertStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub search: ElasticConfig,
    /// Without it emails are only logged.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Full SeaORM URL; defaults to a SQLite file under `data_dir`.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            url: None,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => AlertStore::sqlite_url(Path::new(&self.data_dir)),
        }
    }

    pub fn redacted_url(&self) -> String {
        redact_url(&self.connection_url())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between check cycles.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_enabled")]
    pub dedupe: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_secs: default_tick_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            max_results: default_max_results(),
            dedupe: default_enabled(),
        }
    }
}

impl CheckConfig {
    pub fn options(&self) -> CheckOptions {
        CheckOptions {
            search_timeout: Duration::from_secs(self.search_timeout_secs),
            max_concurrent: self.max_concurrent,
            max_results: self.max_results,
            dedupe: self.dedupe,
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    3600
}

fn default_search_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_results() -> usize {
    50
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config = Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path, e))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.check.tick_secs == 0 {
            anyhow::bail!("check.tick_secs must be at least 1");
        }
        if self.check.search_timeout_secs == 0 {
            anyhow::bail!("check.search_timeout_secs must be at least 1");
        }
        if self.check.max_concurrent == 0 {
            anyhow::bail!("check.max_concurrent must be at least 1");
        }
        if self.check.max_results == 0 {
            anyhow::bail!("check.max_results must be at least 1");
        }
        Ok(())
    }
}
