//! Types for torrent client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during torrent client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

impl TorrentClientError {
    /// Map a reqwest error the same way for every backend.
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TorrentClientError::Timeout
        } else if e.is_connect() {
            TorrentClientError::ConnectionFailed(e.to_string())
        } else {
            TorrentClientError::ApiError(e.to_string())
        }
    }
}

/// State of a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Downloading from peers.
    Downloading,
    /// Seeding to peers.
    Seeding,
    /// Download or upload is paused.
    Paused,
    /// Checking file integrity.
    Checking,
    /// Queued for download.
    Queued,
    /// Stalled (no peers).
    Stalled,
    /// Error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl TorrentState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Checking => "checking",
            TorrentState::Queued => "queued",
            TorrentState::Stalled => "stalled",
            TorrentState::Error => "error",
            TorrentState::Unknown => "unknown",
        }
    }
}

/// Information about a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Current state.
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0) over the wanted files.
    pub progress: f64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Save path on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Path of the payload itself (file or top-level directory), when the
    /// daemon reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
    /// Category/label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Tags attached to the torrent.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the torrent was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl TorrentInfo {
    /// Whether every wanted file has been downloaded.
    pub fn is_complete(&self) -> bool {
        self.progress >= 1.0
    }

    /// Best guess at where the payload lives on disk.
    pub fn payload_path(&self) -> Option<String> {
        if let Some(path) = self.content_path.as_ref().filter(|p| !p.is_empty()) {
            return Some(path.clone());
        }
        self.save_path
            .as_ref()
            .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), self.name))
    }
}

/// Request to add a new torrent by URL or magnet link.
#[derive(Debug, Clone)]
pub struct AddTorrentRequest {
    /// `.torrent` URL or magnet URI; the daemon fetches it.
    pub url: String,
    /// Optional download path override.
    pub download_path: Option<String>,
    /// Optional category/label.
    pub category: Option<String>,
    /// Start paused.
    pub paused: bool,
    /// Temporary correlation tag.
    pub tag: Option<String>,
}

impl AddTorrentRequest {
    /// Create a request with default options.
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            download_path: None,
            category: None,
            paused: false,
            tag: None,
        }
    }

    /// Set the download path.
    pub fn with_download_path(mut self, path: Option<String>) -> Self {
        self.download_path = path;
        self
    }

    /// Set the category.
    pub fn with_category(mut self, cat: impl Into<String>) -> Self {
        self.category = Some(cat.into());
        self
    }

    /// Set whether to start paused.
    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    /// Attach a correlation tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Filters for listing torrents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentFilters {
    /// Filter by category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Filter by tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl TorrentFilters {
    /// Only torrents in this category.
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            tag: None,
        }
    }

    /// Check if any filters are set.
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.tag.is_none()
    }

    /// Client-side filtering for daemons that cannot filter server-side.
    pub fn matches(&self, torrent: &TorrentInfo) -> bool {
        let category_ok = match &self.category {
            Some(c) => torrent.category.as_deref() == Some(c.as_str()),
            None => true,
        };
        let tag_ok = match &self.tag {
            Some(t) => torrent.tags.iter().any(|x| x == t),
            None => true,
        };
        category_ok && tag_ok
    }
}

/// Result of adding a torrent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddTorrentResult {
    /// Info hash, when the daemon reports it synchronously.
    pub hash: Option<String>,
}

/// One file inside a torrent as the daemon sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    /// Daemon-side file id or index.
    pub id: usize,
    /// Path relative to the torrent root.
    pub name: String,
    /// Daemon priority; 0 means the file is skipped.
    pub priority: i64,
}

impl TorrentFileEntry {
    pub fn is_wanted(&self) -> bool {
        self.priority > 0
    }
}

/// Trait for torrent daemon backends.
///
/// These are the primitives each daemon family exposes; the acquisition
/// protocol built on top of them lives in [`super::Downloader`].
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Check connectivity and credentials; returns the daemon version.
    async fn test_connection(&self) -> Result<String, TorrentClientError>;

    /// Add a new torrent.
    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError>;

    /// List torrents, most recently added first.
    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError>;

    /// Files of a torrent. Empty while a magnet has no metadata yet.
    async fn torrent_files(&self, hash: &str) -> Result<Vec<TorrentFileEntry>, TorrentClientError>;

    /// Mark files as wanted or skipped.
    async fn set_file_priorities(
        &self,
        hash: &str,
        file_ids: &[usize],
        wanted: bool,
    ) -> Result<(), TorrentClientError>;

    /// Resume a paused torrent.
    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError>;

    /// Remove a torrent.
    /// If `delete_files` is true, also delete downloaded files.
    async fn remove_torrent(&self, hash: &str, delete_files: bool)
        -> Result<(), TorrentClientError>;

    /// Detach a tag from a torrent. No-op for daemons without tags.
    async fn remove_tag(&self, hash: &str, tag: &str) -> Result<(), TorrentClientError>;
}

/// Sort most recently added first; unknown add times go last.
pub(crate) fn sort_recent_first(torrents: &mut [TorrentInfo]) {
    torrents.sort_by(|a, b| b.added_at.cmp(&a.added_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(hash: &str) -> TorrentInfo {
        TorrentInfo {
            hash: hash.to_string(),
            name: "Game Pack".to_string(),
            state: TorrentState::Seeding,
            progress: 1.0,
            size_bytes: 100,
            save_path: Some("/downloads/".to_string()),
            content_path: None,
            category: Some("title-updates".to_string()),
            tags: vec!["acq-1".to_string()],
            added_at: None,
        }
    }

    #[test]
    fn test_torrent_state_as_str() {
        assert_eq!(TorrentState::Downloading.as_str(), "downloading");
        assert_eq!(TorrentState::Seeding.as_str(), "seeding");
        assert_eq!(TorrentState::Paused.as_str(), "paused");
        assert_eq!(TorrentState::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_payload_path() {
        let mut t = info("a");
        assert_eq!(t.payload_path().as_deref(), Some("/downloads/Game Pack"));

        t.content_path = Some("/downloads/Game Pack/file.nsp".to_string());
        assert_eq!(
            t.payload_path().as_deref(),
            Some("/downloads/Game Pack/file.nsp")
        );

        t.content_path = None;
        t.save_path = None;
        assert!(t.payload_path().is_none());
    }

    #[test]
    fn test_add_torrent_request_builder() {
        let req = AddTorrentRequest::url("magnet:?xt=urn:btih:abc123")
            .with_download_path(Some("/downloads".to_string()))
            .with_category("updates")
            .with_paused(true)
            .with_tag("acq-1");

        assert_eq!(req.url, "magnet:?xt=urn:btih:abc123");
        assert_eq!(req.download_path.as_deref(), Some("/downloads"));
        assert_eq!(req.category.as_deref(), Some("updates"));
        assert!(req.paused);
        assert_eq!(req.tag.as_deref(), Some("acq-1"));
    }

    #[test]
    fn test_filters_match() {
        let t = info("a");
        assert!(TorrentFilters::default().matches(&t));
        assert!(TorrentFilters::category("title-updates").matches(&t));
        assert!(!TorrentFilters::category("movies").matches(&t));

        let tagged = TorrentFilters {
            category: None,
            tag: Some("acq-2".to_string()),
        };
        assert!(!tagged.matches(&t));
        assert!(!tagged.is_empty());
    }

    #[test]
    fn test_sort_recent_first() {
        let mut older = info("old");
        older.added_at = Utc.timestamp_opt(1_700_000_000, 0).single();
        let mut newer = info("new");
        newer.added_at = Utc.timestamp_opt(1_700_000_500, 0).single();
        let unknown = info("unknown");

        let mut list = vec![older, unknown, newer];
        sort_recent_first(&mut list);
        let order: Vec<&str> = list.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(order, vec!["new", "old", "unknown"]);
    }

    #[test]
    fn test_file_entry_wanted() {
        let entry = TorrentFileEntry {
            id: 0,
            name: "a".to_string(),
            priority: 0,
        };
        assert!(!entry.is_wanted());
        assert!(TorrentFileEntry { priority: 1, ..entry }.is_wanted());
    }
}
