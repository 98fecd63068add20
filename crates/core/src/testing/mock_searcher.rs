//! Mock searcher for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::searcher::{IndexerInfo, SearchError, SearchResult, Searcher, SystemStatus};

type QueryHandler = Box<dyn Fn(&str) -> Option<Vec<SearchResult>> + Send + Sync>;

/// A recorded search call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    pub query: String,
    pub indexer_ids: Vec<i64>,
}

/// Mock implementation of the Searcher trait.
///
/// Returns the configured results for every query unless a query handler
/// overrides them.
///
/// # Example
///
/// ```rust,ignore
/// let searcher = MockSearcher::new();
/// searcher.set_results(vec![fixtures::search_result("Game Update", 10)]).await;
///
/// // Only the fallback query finds anything
/// searcher.set_query_handler(|q| {
///     if q.ends_with("update") { None } else { Some(vec![]) }
/// }).await;
/// ```
pub struct MockSearcher {
    results: Arc<RwLock<Vec<SearchResult>>>,
    searches: Arc<RwLock<Vec<RecordedSearch>>>,
    next_error: Arc<RwLock<Option<SearchError>>>,
    indexers: Arc<RwLock<Vec<IndexerInfo>>>,
    query_handler: Arc<RwLock<Option<QueryHandler>>>,
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            results: Arc::new(RwLock::new(Vec::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            indexers: Arc::new(RwLock::new(vec![IndexerInfo {
                id: 1,
                name: "mock-indexer".to_string(),
                enabled: true,
                protocol: Some("torrent".to_string()),
            }])),
            query_handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the results to return for subsequent searches.
    pub async fn set_results(&self, results: Vec<SearchResult>) {
        *self.results.write().await = results;
    }

    /// Get recorded search queries.
    pub async fn recorded_searches(&self) -> Vec<RecordedSearch> {
        self.searches.read().await.clone()
    }

    pub async fn search_count(&self) -> usize {
        self.searches.read().await.len()
    }

    /// Configure the next search to fail with the given error.
    pub async fn set_next_error(&self, error: SearchError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn set_indexers(&self, indexers: Vec<IndexerInfo>) {
        *self.indexers.write().await = indexers;
    }

    /// Per-query results. Returning `None` falls back to the configured results.
    pub async fn set_query_handler<F>(&self, handler: F)
    where
        F: Fn(&str) -> Option<Vec<SearchResult>> + Send + Sync + 'static,
    {
        *self.query_handler.write().await = Some(Box::new(handler));
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn system_status(&self) -> Result<SystemStatus, SearchError> {
        Ok(SystemStatus {
            app_name: "MockIndexer".to_string(),
            version: "1.0.0".to_string(),
        })
    }

    async fn list_indexers(&self) -> Result<Vec<IndexerInfo>, SearchError> {
        Ok(self.indexers.read().await.clone())
    }

    async fn search(
        &self,
        query: &str,
        indexer_ids: &[i64],
    ) -> Result<Vec<SearchResult>, SearchError> {
        self.searches.write().await.push(RecordedSearch {
            query: query.to_string(),
            indexer_ids: indexer_ids.to_vec(),
        });

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        if let Some(handler) = self.query_handler.read().await.as_ref() {
            if let Some(results) = handler(query) {
                return Ok(results);
            }
        }
        Ok(self.results.read().await.clone())
    }
}
