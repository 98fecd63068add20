//! Types for the acquisition coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::library::LibraryError;
use crate::searcher::{SearchError, SearchResult};
use crate::torrent_client::TorrentClientError;

/// Outcome of a public operation: a flag and a message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    pub ok: bool,
    pub message: String,
}

impl OpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

impl From<AcquisitionError> for OpResult {
    fn from(e: AcquisitionError) -> Self {
        OpResult::fail(e.to_string())
    }
}

/// A torrent handed to the daemon and not yet moved into the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDownload {
    /// Dedupe key, `"{title_id}:{version}"` or `"manual:{timestamp}"`.
    pub key: String,
    pub title_id: Option<String>,
    pub expected_version: Option<u64>,
    /// Matched case-insensitively against daemon torrent names.
    pub expected_name: Option<String>,
    pub torrent_hash: Option<String>,
    pub download_url: String,
    pub queued_at: DateTime<Utc>,
}

impl PendingDownload {
    /// Whether a completed daemon torrent belongs to this entry by name.
    pub fn matches_name(&self, torrent_name: &str) -> bool {
        match &self.expected_name {
            Some(expected) if !expected.trim().is_empty() => torrent_name
                .to_lowercase()
                .contains(&expected.trim().to_lowercase()),
            _ => false,
        }
    }

    pub fn matches_hash(&self, hash: &str) -> bool {
        self.torrent_hash
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(hash))
    }
}

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSnapshot {
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    /// Oldest first.
    pub pending: Vec<PendingDownload>,
    /// Sorted.
    pub completed: Vec<String>,
}

/// A manual single-download request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueRequest {
    pub download_url: String,
    #[serde(default)]
    pub expected_name: Option<String>,
    #[serde(default)]
    pub update_only: bool,
    #[serde(default)]
    pub expected_version: Option<u64>,
    /// Queue even if the same download is already pending.
    #[serde(default)]
    pub allow_duplicates: bool,
}

/// Candidate releases for one title, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub ok: bool,
    pub message: String,
    pub results: Vec<SearchResult>,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    /// Pending entries matched to a completed torrent.
    pub matched: usize,
    /// Completed torrents that matched no pending entry.
    pub orphans: usize,
    /// Payloads that actually landed in the library.
    pub moved: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn processed(&self) -> usize {
        self.matched + self.orphans
    }
}

/// Errors that can occur while acquiring a title.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("Torrent client error: {0}")]
    Client(#[from] TorrentClientError),

    /// Nothing usable was found. An ordinary outcome, not a fault.
    #[error("{0}")]
    NoMatch(String),

    #[error("Already queued: {0}")]
    AlreadyQueued(String),

    #[error("Already downloaded: {0}")]
    AlreadyCompleted(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// The daemon refused or the add could not be restricted.
    #[error("{0}")]
    AddFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(expected_name: Option<&str>, hash: Option<&str>) -> PendingDownload {
        PendingDownload {
            key: "0100ABCD00010000:65536".to_string(),
            title_id: Some("0100ABCD00010000".to_string()),
            expected_version: Some(65536),
            expected_name: expected_name.map(String::from),
            torrent_hash: hash.map(String::from),
            download_url: "http://indexer/dl/1".to_string(),
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn test_matches_name_is_case_insensitive_substring() {
        let p = pending(Some("Game Update"), None);
        assert!(p.matches_name("[Scene] GAME UPDATE v65536"));
        assert!(!p.matches_name("Other Game"));
        assert!(!pending(None, None).matches_name("anything"));
        assert!(!pending(Some("  "), None).matches_name("anything"));
    }

    #[test]
    fn test_matches_hash() {
        let p = pending(None, Some("ABCDEF"));
        assert!(p.matches_hash("abcdef"));
        assert!(!p.matches_hash("abc"));
        assert!(!pending(None, None).matches_hash("abcdef"));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AcquisitionError::NotConfigured("Torrent client").to_string(),
            "Torrent client not configured"
        );
        let op: OpResult = AcquisitionError::NoMatch("No results for 'Game'".to_string()).into();
        assert!(!op.ok);
        assert_eq!(op.message, "No results for 'Game'");
    }

    #[test]
    fn test_queue_request_defaults() {
        let req: QueueRequest =
            serde_json::from_str(r#"{"download_url": "magnet:?xt=urn:btih:abc"}"#).unwrap();
        assert!(!req.update_only);
        assert!(!req.allow_duplicates);
        assert!(req.expected_name.is_none());
    }
}
