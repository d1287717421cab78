use crate::search::{SearchError, SearchProvider, SearchRequest, SearchResults};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tidings_common::types::MatchRef;

/// Connection settings for an Elasticsearch-compatible `_search` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Field holding the searchable text of a document.
    #[serde(default = "default_text_field")]
    pub text_field: String,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index: default_index(),
            username: None,
            password: None,
            text_field: default_text_field(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "entities".to_string()
}

fn default_text_field() -> String {
    "text".to_string()
}

pub struct ElasticSearchProvider {
    client: reqwest::Client,
    config: ElasticConfig,
}

impl ElasticSearchProvider {
    pub fn new(config: ElasticConfig, request_timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/{}/_search",
            self.config.url.trim_end_matches('/'),
            self.config.index
        )
    }
}

/// Builds the `_search` body for one alert window.
///
/// Free text goes through `simple_query_string` with AND semantics, so
/// bookmarked multi-word queries keep working without a precise match query.
/// Structured filters become `term` clauses; the time window is a `range` on
/// `created_at` (exclusive lower bound, inclusive upper bound).
pub fn build_query(request: &SearchRequest, text_field: &str) -> Value {
    let mut must = Vec::new();
    if let Some(text) = request.query.free_text() {
        must.push(json!({
            "simple_query_string": {
                "query": text,
                "fields": [text_field],
                "default_operator": "AND",
                "minimum_should_match": "90%"
            }
        }));
    }

    let mut filter: Vec<Value> = request
        .query
        .filters()
        .into_iter()
        .flatten()
        .map(|(field, value)| json!({ "term": { field: value } }))
        .collect();

    let mut range = serde_json::Map::new();
    if let Some(since) = request.since {
        range.insert("gt".into(), json!(since.to_rfc3339()));
    }
    range.insert("lte".into(), json!(request.until.to_rfc3339()));
    filter.push(json!({ "range": { "created_at": range } }));

    json!({
        "size": request.limit,
        "track_total_hits": true,
        "sort": [{ "created_at": { "order": "desc" } }],
        "query": {
            "bool": {
                "must": must,
                "filter": filter
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: HitSource,
}

#[derive(Debug, Default, Deserialize)]
struct HitSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Turns a `_search` response into results. Hits without a parseable
/// `created_at` cannot be placed in a window and are dropped.
pub fn parse_response(body: &str) -> Result<SearchResults, SearchError> {
    let response: SearchResponse = serde_json::from_str(body)?;

    let hits: Vec<MatchRef> = response
        .hits
        .hits
        .into_iter()
        .filter_map(|hit| {
            let Some(created_at) = hit.source.created_at else {
                tracing::debug!(id = %hit.id, "Dropping hit without created_at");
                return None;
            };
            Some(MatchRef {
                id: hit.id,
                title: hit.source.title.or(hit.source.name),
                created_at,
                score: hit.score,
            })
        })
        .collect();

    let total = match response.hits.total {
        Some(TotalHits::Count(n)) | Some(TotalHits::Object { value: n }) => n,
        None => hits.len() as u64,
    };

    Ok(SearchResults { total, hits })
}

#[async_trait]
impl SearchProvider for ElasticSearchProvider {
    async fn resolve(&self, request: &SearchRequest) -> Result<SearchResults, SearchError> {
        let body = build_query(request, &self.config.text_field);

        let mut req = self.client.post(self.search_url()).json(&body);
        if let Some(user) = &self.config.username {
            req = req.basic_auth(user, self.config.password.as_deref());
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(SearchError::InvalidQuery(text));
        }
        if !status.is_success() {
            return Err(SearchError::Unavailable {
                status: status.as_u16(),
                body: text,
            });
        }

        let mut results = parse_response(&text)?;
        results.hits.truncate(request.limit);
        Ok(results)
    }

    fn provider_name(&self) -> &str {
        "elasticsearch"
    }
}
