//! Types for the indexer search client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One normalized indexer hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Release title as reported by the indexer.
    pub title: String,
    /// Size in bytes.
    pub size: u64,
    pub seeders: u32,
    pub leechers: u32,
    /// `.torrent` download URL or magnet link.
    pub download_url: String,
    /// Details page on the indexer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
    pub indexer_id: i64,
}

/// An indexer known to the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerInfo {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Aggregator system status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub app_name: String,
    pub version: String,
}

/// Errors that can occur during search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Indexer returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse indexer response: {0}")]
    Parse(String),

    #[error("Indexer request timeout")]
    Timeout,
}

impl SearchError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for indexer aggregation backends.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Aggregator status; doubles as a connectivity check.
    async fn system_status(&self) -> Result<SystemStatus, SearchError>;

    /// All indexers configured in the aggregator.
    async fn list_indexers(&self) -> Result<Vec<IndexerInfo>, SearchError>;

    /// Free-text search. An empty `indexer_ids` searches every indexer.
    async fn search(
        &self,
        query: &str,
        indexer_ids: &[i64],
    ) -> Result<Vec<SearchResult>, SearchError>;
}
