use anyhow::Result;
use serde::{Deserialize, Serialize};
use tidings_common::types::Query;
use tidings_storage::AlertStore;

// ---- Seed file types (used by `init-alerts` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsSeedFile {
    #[serde(default)]
    pub roles: Vec<SeedRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRole {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub alerts: Vec<SeedQuery>,
}

/// Either a bare string (free text) or a tagged [`Query`] object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedQuery {
    Text(String),
    Query(Query),
}

impl SeedQuery {
    pub fn into_query(self) -> Query {
        match self {
            SeedQuery::Text(text) => Query::text(text),
            SeedQuery::Query(query) => query,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub roles_created: u32,
    pub roles_skipped: u32,
    pub alerts_created: u32,
}

pub fn load(path: &str) -> Result<AlertsSeedFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
    let seed = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))?;
    Ok(seed)
}

/// Creates every role in the seed with its alerts. Roles that already exist
/// (matched by name) are left untouched, alerts included.
pub async fn apply(store: &AlertStore, seed: AlertsSeedFile) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for role in seed.roles {
        if store.get_role_by_name(&role.name).await?.is_some() {
            tracing::warn!(name = %role.name, "Role already exists, skipping");
            report.roles_skipped += 1;
            continue;
        }

        let created = store.create_role(&role.name, role.email.as_deref()).await?;
        tracing::info!(name = %created.name, id = %created.id, "Role created");
        report.roles_created += 1;

        for query in role.alerts {
            let query = query.into_query();
            if query.is_empty() {
                tracing::warn!(role = %created.name, "Skipping alert with empty query");
                continue;
            }
            let alert = store.create_alert(&created.id, &query).await?;
            tracing::info!(role = %created.name, id = %alert.id, query = %query, "Alert created");
            report.alerts_created += 1;
        }
    }

    Ok(report)
}
