//! Mock torrent client for testing.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::torrent_client::{
    sort_recent_first, AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError,
    TorrentFileEntry, TorrentFilters, TorrentInfo, TorrentState,
};

/// What the next add creates in the mock daemon.
#[derive(Debug, Clone)]
pub struct MockTorrentSpec {
    pub hash: String,
    pub name: String,
    /// File names inside the torrent, in id order.
    pub files: Vec<String>,
}

impl MockTorrentSpec {
    pub fn new(hash: &str, name: &str, files: &[&str]) -> Self {
        Self {
            hash: hash.to_string(),
            name: name.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A recorded `remove_torrent` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRemoval {
    pub hash: String,
    pub delete_files: bool,
}

#[derive(Debug, Clone)]
struct MockTorrent {
    info: TorrentInfo,
    files: Vec<TorrentFileEntry>,
    paused: bool,
}

/// Mock implementation of the TorrentClient trait.
///
/// Provides controllable behavior for testing:
/// - Stage what the next add creates (hash, name, file list)
/// - Mark torrents complete
/// - Make file priorities refuse to stick
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// let client = MockTorrentClient::new();
/// client
///     .stage_add(MockTorrentSpec::new("abc", "Game", &["Game [v65536].nsp"]))
///     .await;
///
/// // ... run an add through a Downloader ...
///
/// client.set_complete("abc").await;
/// assert_eq!(client.removals().await.len(), 0);
/// ```
#[derive(Debug)]
pub struct MockTorrentClient {
    torrents: Arc<RwLock<Vec<MockTorrent>>>,
    staged: Arc<RwLock<Vec<MockTorrentSpec>>>,
    added: Arc<RwLock<Vec<AddTorrentRequest>>>,
    removals: Arc<RwLock<Vec<RecordedRemoval>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    /// Whether `add_torrent` reports the new hash (like Transmission) or not
    /// (like qBittorrent).
    report_hash: bool,
    /// When set, `set_file_priorities` is accepted but changes nothing.
    ignore_priorities: Arc<RwLock<bool>>,
    /// When set, `list_torrents` never shows anything.
    hide_from_listing: Arc<RwLock<bool>>,
    /// When set, adds ignore the requested tag (no label support).
    drop_tags: Arc<RwLock<bool>>,
    save_path: String,
    counter: Arc<RwLock<u32>>,
}

impl Default for MockTorrentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTorrentClient {
    /// Create a mock that does not report hashes from `add_torrent`.
    pub fn new() -> Self {
        Self {
            torrents: Arc::new(RwLock::new(Vec::new())),
            staged: Arc::new(RwLock::new(Vec::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            removals: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            report_hash: false,
            ignore_priorities: Arc::new(RwLock::new(false)),
            hide_from_listing: Arc::new(RwLock::new(false)),
            drop_tags: Arc::new(RwLock::new(false)),
            save_path: "/mock/downloads".to_string(),
            counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Create a mock whose `add_torrent` reports the new hash.
    pub fn reporting_hash() -> Self {
        Self {
            report_hash: true,
            ..Self::new()
        }
    }

    /// Create a mock with a custom save path.
    pub fn with_save_path(save_path: impl Into<String>) -> Self {
        Self {
            save_path: save_path.into(),
            ..Self::new()
        }
    }

    /// Queue what the next add creates. Unstaged adds get a generated hash,
    /// a name taken from the URL and no files.
    pub async fn stage_add(&self, spec: MockTorrentSpec) {
        self.staged.write().await.push(spec);
    }

    /// Put a torrent into the daemon directly, as if added elsewhere.
    pub async fn insert_torrent(&self, spec: MockTorrentSpec, category: &str) {
        let torrent = self.build(spec, Some(category.to_string()), Vec::new(), false).await;
        self.torrents.write().await.push(torrent);
    }

    /// Mark a torrent fully downloaded.
    pub async fn set_complete(&self, hash: &str) {
        let mut torrents = self.torrents.write().await;
        if let Some(t) = torrents.iter_mut().find(|t| t.info.hash == hash) {
            t.info.progress = 1.0;
            t.info.state = TorrentState::Seeding;
        }
    }

    pub async fn set_ignore_priorities(&self, ignore: bool) {
        *self.ignore_priorities.write().await = ignore;
    }

    pub async fn set_hide_from_listing(&self, hide: bool) {
        *self.hide_from_listing.write().await = hide;
    }

    pub async fn set_drop_tags(&self, drop: bool) {
        *self.drop_tags.write().await = drop;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Recorded add requests.
    pub async fn added_torrents(&self) -> Vec<AddTorrentRequest> {
        self.added.read().await.clone()
    }

    /// Recorded removals.
    pub async fn removals(&self) -> Vec<RecordedRemoval> {
        self.removals.read().await.clone()
    }

    /// Current state of a torrent, if the daemon still has it.
    pub async fn torrent(&self, hash: &str) -> Option<TorrentInfo> {
        self.torrents
            .read()
            .await
            .iter()
            .find(|t| t.info.hash == hash)
            .map(|t| t.info.clone())
    }

    /// Whether a torrent is paused.
    pub async fn is_paused(&self, hash: &str) -> Option<bool> {
        self.torrents
            .read()
            .await
            .iter()
            .find(|t| t.info.hash == hash)
            .map(|t| t.paused)
    }

    /// Ids of the wanted files of a torrent.
    pub async fn wanted_files(&self, hash: &str) -> Vec<usize> {
        self.torrents
            .read()
            .await
            .iter()
            .find(|t| t.info.hash == hash)
            .map(|t| t.files.iter().filter(|f| f.is_wanted()).map(|f| f.id).collect())
            .unwrap_or_default()
    }

    pub async fn torrent_count(&self) -> usize {
        self.torrents.read().await.len()
    }

    async fn take_error(&self) -> Result<(), TorrentClientError> {
        match self.next_error.write().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn build(
        &self,
        spec: MockTorrentSpec,
        category: Option<String>,
        tags: Vec<String>,
        paused: bool,
    ) -> MockTorrent {
        let mut counter = self.counter.write().await;
        *counter += 1;
        // Distinct, increasing timestamps keep "most recent first" stable.
        let added_at = Utc::now() + Duration::seconds(i64::from(*counter));

        MockTorrent {
            info: TorrentInfo {
                hash: spec.hash,
                name: spec.name.clone(),
                state: if paused {
                    TorrentState::Paused
                } else {
                    TorrentState::Downloading
                },
                progress: 0.0,
                size_bytes: 1024 * 1024,
                save_path: Some(self.save_path.clone()),
                content_path: Some(format!("{}/{}", self.save_path, spec.name)),
                category,
                tags,
                added_at: Some(added_at),
            },
            files: spec
                .files
                .into_iter()
                .enumerate()
                .map(|(id, name)| TorrentFileEntry {
                    id,
                    name,
                    priority: 1,
                })
                .collect(),
            paused,
        }
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn test_connection(&self) -> Result<String, TorrentClientError> {
        self.take_error().await?;
        Ok("mock-1.0".to_string())
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        self.take_error().await?;
        self.added.write().await.push(request.clone());

        let spec = {
            let mut staged = self.staged.write().await;
            if staged.is_empty() {
                None
            } else {
                Some(staged.remove(0))
            }
        };
        let spec = match spec {
            Some(spec) => spec,
            None => {
                let n = *self.counter.read().await + 1;
                let name = request
                    .url
                    .rsplit('/')
                    .next()
                    .unwrap_or("torrent")
                    .to_string();
                MockTorrentSpec {
                    hash: format!("{:040x}", n),
                    name,
                    files: Vec::new(),
                }
            }
        };

        if self
            .torrents
            .read()
            .await
            .iter()
            .any(|t| t.info.hash == spec.hash)
        {
            return Err(TorrentClientError::ApiError(format!(
                "torrent {} already exists",
                spec.hash
            )));
        }

        let hash = spec.hash.clone();
        let tags = if *self.drop_tags.read().await {
            Vec::new()
        } else {
            request.tag.clone().into_iter().collect()
        };
        let torrent = self
            .build(spec, request.category.clone(), tags, request.paused)
            .await;
        self.torrents.write().await.push(torrent);

        Ok(AddTorrentResult {
            hash: self.report_hash.then_some(hash),
        })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        self.take_error().await?;
        if *self.hide_from_listing.read().await {
            return Ok(Vec::new());
        }
        let mut listing: Vec<TorrentInfo> = self
            .torrents
            .read()
            .await
            .iter()
            .map(|t| t.info.clone())
            .filter(|t| filters.matches(t))
            .collect();
        sort_recent_first(&mut listing);
        Ok(listing)
    }

    async fn torrent_files(&self, hash: &str) -> Result<Vec<TorrentFileEntry>, TorrentClientError> {
        self.take_error().await?;
        self.torrents
            .read()
            .await
            .iter()
            .find(|t| t.info.hash == hash)
            .map(|t| t.files.clone())
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }

    async fn set_file_priorities(
        &self,
        hash: &str,
        file_ids: &[usize],
        wanted: bool,
    ) -> Result<(), TorrentClientError> {
        self.take_error().await?;
        let ignore = *self.ignore_priorities.read().await;
        let mut torrents = self.torrents.write().await;
        let torrent = torrents
            .iter_mut()
            .find(|t| t.info.hash == hash)
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))?;
        if ignore {
            return Ok(());
        }
        for file in torrent.files.iter_mut().filter(|f| file_ids.contains(&f.id)) {
            file.priority = i64::from(wanted);
        }
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.take_error().await?;
        let mut torrents = self.torrents.write().await;
        let torrent = torrents
            .iter_mut()
            .find(|t| t.info.hash == hash)
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))?;
        torrent.paused = false;
        if torrent.info.state == TorrentState::Paused {
            torrent.info.state = TorrentState::Downloading;
        }
        Ok(())
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        self.take_error().await?;
        self.removals.write().await.push(RecordedRemoval {
            hash: hash.to_string(),
            delete_files,
        });
        let mut torrents = self.torrents.write().await;
        let before = torrents.len();
        torrents.retain(|t| t.info.hash != hash);
        if torrents.len() == before {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }
        Ok(())
    }

    async fn remove_tag(&self, hash: &str, tag: &str) -> Result<(), TorrentClientError> {
        self.take_error().await?;
        let mut torrents = self.torrents.write().await;
        if let Some(t) = torrents.iter_mut().find(|t| t.info.hash == hash) {
            t.info.tags.retain(|x| x != tag);
        }
        Ok(())
    }
}
