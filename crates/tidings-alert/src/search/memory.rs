use crate::search::{SearchError, SearchProvider, SearchRequest, SearchResults};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tidings_common::types::MatchRef;

/// A document held by [`MemorySearchProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub text: String,
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: None,
            text: text.into(),
            fields: BTreeMap::new(),
            created_at,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Every whitespace-separated term must occur in the text, ignoring case.
    fn matches_text(&self, query: &str) -> bool {
        let haystack = self.text.to_lowercase();
        query
            .split_whitespace()
            .all(|term| haystack.contains(&term.to_lowercase()))
    }

    fn matches(&self, request: &SearchRequest) -> bool {
        if !request.in_window(self.created_at) {
            return false;
        }
        if let Some(text) = request.query.free_text() {
            if !self.matches_text(text) {
                return false;
            }
        }
        request
            .query
            .filters()
            .into_iter()
            .flatten()
            .all(|(k, v)| self.fields.get(k) == Some(v))
    }
}

/// In-process search backend for local runs and tests.
#[derive(Default)]
pub struct MemorySearchProvider {
    documents: RwLock<Vec<Document>>,
}

impl MemorySearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, document: Document) {
        let mut docs = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        docs.retain(|d| d.id != document.id);
        docs.push(document);
    }

    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SearchProvider for MemorySearchProvider {
    async fn resolve(&self, request: &SearchRequest) -> Result<SearchResults, SearchError> {
        let docs = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut found: Vec<&Document> = docs.iter().filter(|d| d.matches(request)).collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = found.len() as u64;
        let hits = found
            .into_iter()
            .take(request.limit)
            .map(|d| MatchRef {
                id: d.id.clone(),
                title: d.title.clone(),
                created_at: d.created_at,
                score: None,
            })
            .collect();

        Ok(SearchResults { total, hits })
    }

    fn provider_name(&self) -> &str {
        "memory"
    }
}
