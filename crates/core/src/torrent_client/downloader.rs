//! Daemon-independent download operations.
//!
//! `Downloader` drives any [`TorrentClient`] through the add-and-restrict
//! protocol: dry-run the file selection against the descriptor, add (paused
//! when restricting) with a correlation tag, find the daemon's id for the new
//! torrent, keep only the wanted files, verify, resume. Failures come back as values; nothing
//! here returns an error past the adapter boundary.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acquisition::OpResult;
use crate::config::TorrentClientConfig;
use crate::metainfo::{fetch_metadata, is_magnet, magnet_info_hash};
use crate::metrics;
use crate::selection::{select_files, update_number_hint, without_russian, SelectionParams};

use super::{
    AddTorrentRequest, TorrentClient, TorrentClientError, TorrentFileEntry, TorrentFilters,
};

/// How many of the most recently added torrents the name fallback looks at.
const RECENT_WINDOW: usize = 10;

const NO_MATCH_PREFIX: &str = "No matching update version found";

/// Tuning for the polling loops.
#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    /// Default category for adds and listings.
    pub category: String,
    pub download_path: Option<String>,
    /// Timeout for the descriptor pre-fetch.
    pub timeout: Duration,
    pub resolve_attempts: u32,
    pub resolve_delay: Duration,
    pub file_list_attempts: u32,
    pub verify_attempts: u32,
}

impl From<&TorrentClientConfig> for DownloaderSettings {
    fn from(config: &TorrentClientConfig) -> Self {
        Self {
            category: config.category.clone(),
            download_path: config.download_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs as u64),
            resolve_attempts: config.resolve_attempts.max(1),
            resolve_delay: Duration::from_millis(config.resolve_delay_ms),
            file_list_attempts: config.file_list_attempts.max(1),
            verify_attempts: config.verify_attempts,
        }
    }
}

/// Parameters of one add.
#[derive(Debug, Clone, Default)]
pub struct AddRequest {
    pub download_url: String,
    /// Overrides the configured category.
    pub category: Option<String>,
    /// Overrides the configured download path.
    pub download_path: Option<String>,
    /// Used to find the torrent in the daemon when nothing better is known.
    pub expected_name: Option<String>,
    /// Only fetch the files of one version.
    pub update_only: bool,
    pub exclude_russian: bool,
    pub expected_version: Option<u64>,
}

/// Outcome of [`Downloader::add`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOutcome {
    pub ok: bool,
    pub message: String,
    pub hash: Option<String>,
}

impl AddOutcome {
    fn success(message: impl Into<String>, hash: Option<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            hash,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            hash: None,
        }
    }

    /// The torrent holds no file of the wanted version.
    pub fn is_no_match(&self) -> bool {
        !self.ok && self.message.starts_with(NO_MATCH_PREFIX)
    }
}

/// A finished torrent as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTorrent {
    pub hash: String,
    pub path: PathBuf,
    pub name: String,
}

/// Uniform download operations over one daemon.
pub struct Downloader {
    client: Arc<dyn TorrentClient>,
    http: Client,
    settings: DownloaderSettings,
}

impl Downloader {
    pub fn new(client: Arc<dyn TorrentClient>, settings: DownloaderSettings) -> Self {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            http,
            settings,
        }
    }

    /// Backend name for logging.
    pub fn backend(&self) -> &str {
        self.client.name()
    }

    pub fn category(&self) -> &str {
        &self.settings.category
    }

    /// Add a torrent, restricting it to the wanted files when asked to.
    pub async fn add(&self, request: AddRequest) -> AddOutcome {
        let category = request
            .category
            .clone()
            .unwrap_or_else(|| self.settings.category.clone());
        let download_path = request
            .download_path
            .clone()
            .or_else(|| self.settings.download_path.clone());
        let params = SelectionParams {
            expected_version: request.expected_version,
            expected_update: request
                .expected_name
                .as_deref()
                .and_then(update_number_hint),
            exclude_russian: request.exclude_russian,
        };

        let metadata = if is_magnet(&request.download_url) {
            None
        } else {
            fetch_metadata(&self.http, &request.download_url, self.settings.timeout).await
        };
        let computed_hash = metadata
            .as_ref()
            .map(|m| m.info_hash.clone())
            .or_else(|| magnet_info_hash(&request.download_url));

        if request.update_only {
            if let Some(meta) = &metadata {
                if select_files(&basenames(&meta.files), &params).is_empty() {
                    info!(
                        url = %request.download_url,
                        files = meta.files.len(),
                        "Descriptor has no file matching the wanted version"
                    );
                    metrics::TORRENT_ADDS.with_label_values(&["no_match"]).inc();
                    return AddOutcome::failure(no_match_message(&params));
                }
            }
        }

        let add = AddTorrentRequest::url(&request.download_url)
            .with_category(&category)
            .with_download_path(download_path);

        if !request.update_only && !request.exclude_russian {
            let result = self.client.add_torrent(add).await;
            metrics::record_external(self.client.name(), "add", &result);
            return match result {
                Ok(added) => {
                    metrics::TORRENT_ADDS.with_label_values(&["added"]).inc();
                    let hash = added.hash.or(computed_hash);
                    info!(hash = ?hash, "Torrent added");
                    AddOutcome::success("Torrent added", hash)
                }
                Err(e) => {
                    metrics::TORRENT_ADDS.with_label_values(&["error"]).inc();
                    AddOutcome::failure(format!("Failed to add torrent: {}", e))
                }
            };
        }

        // Only version-restricted adds start paused; a courtesy filter that
        // cannot find its torrent must not leave it stalled.
        let tag = format!("acq-{}", Uuid::new_v4().simple());
        let result = self
            .client
            .add_torrent(add.with_paused(request.update_only).with_tag(&tag))
            .await;
        metrics::record_external(self.client.name(), "add", &result);
        let added = match result {
            Ok(added) => added,
            Err(e) => {
                metrics::TORRENT_ADDS.with_label_values(&["error"]).inc();
                return AddOutcome::failure(format!("Failed to add torrent: {}", e));
            }
        };

        let hash = match self
            .resolve_hash(
                added.hash.as_deref(),
                computed_hash.as_deref(),
                &tag,
                request.expected_name.as_deref(),
                &category,
            )
            .await
        {
            Some(hash) => hash,
            None if request.update_only => {
                warn!(tag = %tag, "Added torrent could not be located in the daemon");
                metrics::TORRENT_ADDS.with_label_values(&["error"]).inc();
                self.abandon_unresolved(&tag, computed_hash.as_deref()).await;
                return AddOutcome::failure(
                    "Torrent was added but could not be located in the client",
                );
            }
            None => {
                warn!(tag = %tag, "Added torrent could not be located, files left unfiltered");
                for hash in self.tagged(&tag).await {
                    if let Err(e) = self.client.remove_tag(&hash, &tag).await {
                        debug!(hash = %hash, error = %e, "Failed to remove correlation tag");
                    }
                }
                metrics::TORRENT_ADDS.with_label_values(&["added"]).inc();
                return AddOutcome::success("Torrent added", None);
            }
        };
        debug!(hash = %hash, "Resolved added torrent");

        let result = if request.update_only {
            match self.restrict_to_version(&hash, &params).await {
                Ok(()) => self
                    .client
                    .resume_torrent(&hash)
                    .await
                    .map_err(|e| format!("Failed to resume torrent: {}", e)),
                Err(message) => Err(message),
            }
        } else {
            self.deselect_russian(&hash).await;
            Ok(())
        };

        if let Err(e) = self.client.remove_tag(&hash, &tag).await {
            debug!(hash = %hash, error = %e, "Failed to remove correlation tag");
        }

        match result {
            Ok(()) => {
                let label = if request.update_only { "restricted" } else { "added" };
                metrics::TORRENT_ADDS.with_label_values(&[label]).inc();
                info!(hash = %hash, update_only = request.update_only, "Torrent added");
                AddOutcome::success("Torrent added", Some(hash))
            }
            Err(message) => {
                let outcome = AddOutcome::failure(message);
                metrics::TORRENT_ADDS
                    .with_label_values(&[failure_label(&outcome)])
                    .inc();
                self.roll_back(&hash).await;
                outcome
            }
        }
    }

    /// Hashes of every torrent carrying `tag`, regardless of category.
    async fn tagged(&self, tag: &str) -> Vec<String> {
        let filters = TorrentFilters {
            category: None,
            tag: Some(tag.to_string()),
        };
        match self.client.list_torrents(&filters).await {
            Ok(listing) => listing
                .into_iter()
                .filter(|t| t.tags.iter().any(|x| x == tag))
                .map(|t| t.hash)
                .collect(),
            Err(e) => {
                debug!(tag = %tag, error = %e, "Tag listing failed");
                Vec::new()
            }
        }
    }

    /// Last attempt at removing a paused add whose id was never resolved.
    async fn abandon_unresolved(&self, tag: &str, computed: Option<&str>) {
        let mut targets = self.tagged(tag).await;
        if targets.is_empty() {
            targets.extend(computed.map(str::to_lowercase));
        }
        if targets.is_empty() {
            warn!(tag = %tag, "No way to identify the unresolved torrent, leaving it in the daemon");
            return;
        }
        for hash in targets {
            self.roll_back(&hash).await;
        }
    }

    /// Find the daemon id of a just-added torrent.
    ///
    /// Order of preference: the id the daemon reported, the computed info-hash
    /// seen in the listing, the correlation tag, then a name match among the
    /// most recently added torrents of the category.
    async fn resolve_hash(
        &self,
        reported: Option<&str>,
        computed: Option<&str>,
        tag: &str,
        expected_name: Option<&str>,
        category: &str,
    ) -> Option<String> {
        if let Some(hash) = reported.filter(|h| !h.is_empty()) {
            return Some(hash.to_lowercase());
        }

        let name = expected_name
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty());
        let filters = TorrentFilters::category(category);

        for attempt in 0..self.settings.resolve_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.settings.resolve_delay).await;
            }

            let listing = match self.client.list_torrents(&filters).await {
                Ok(listing) => listing,
                Err(e) => {
                    debug!(attempt = attempt, error = %e, "Listing failed while resolving");
                    continue;
                }
            };

            if let Some(hash) = computed {
                if listing.iter().any(|t| t.hash.eq_ignore_ascii_case(hash)) {
                    return Some(hash.to_lowercase());
                }
            }
            if let Some(t) = listing.iter().find(|t| t.tags.iter().any(|x| x == tag)) {
                return Some(t.hash.clone());
            }
            if let Some(name) = &name {
                if let Some(t) = listing
                    .iter()
                    .take(RECENT_WINDOW)
                    .find(|t| t.name.to_lowercase().contains(name.as_str()))
                {
                    return Some(t.hash.clone());
                }
            }
        }
        None
    }

    /// Poll the daemon's file list until a selection exists.
    async fn wait_for_selection(
        &self,
        hash: &str,
        params: &SelectionParams,
    ) -> Option<(Vec<TorrentFileEntry>, HashSet<usize>)> {
        for attempt in 0..self.settings.file_list_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.settings.resolve_delay).await;
            }

            let files = match self.client.torrent_files(hash).await {
                Ok(files) if !files.is_empty() => files,
                Ok(_) => continue,
                Err(e) => {
                    debug!(hash = %hash, error = %e, "File listing failed");
                    continue;
                }
            };

            let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
            let selected: HashSet<usize> = select_files(&basenames(&names), params)
                .into_iter()
                .map(|idx| files[idx].id)
                .collect();
            if !selected.is_empty() {
                return Some((files, selected));
            }
        }
        None
    }

    async fn restrict_to_version(&self, hash: &str, params: &SelectionParams) -> Result<(), String> {
        let (files, wanted) = self
            .wait_for_selection(hash, params)
            .await
            .ok_or_else(|| no_match_message(params))?;

        debug!(
            hash = %hash,
            total = files.len(),
            wanted = wanted.len(),
            "Restricting torrent to selected files"
        );
        self.apply_priorities(hash, &files, &wanted).await
    }

    /// Set priorities, then re-read and retry mismatches one file at a time.
    async fn apply_priorities(
        &self,
        hash: &str,
        files: &[TorrentFileEntry],
        wanted: &HashSet<usize>,
    ) -> Result<(), String> {
        let (keep, skip): (Vec<usize>, Vec<usize>) =
            files.iter().map(|f| f.id).partition(|id| wanted.contains(id));

        self.client
            .set_file_priorities(hash, &skip, false)
            .await
            .map_err(|e| format!("Failed to set file priorities: {}", e))?;
        self.client
            .set_file_priorities(hash, &keep, true)
            .await
            .map_err(|e| format!("Failed to set file priorities: {}", e))?;

        for attempt in 0..=self.settings.verify_attempts {
            let current = self
                .client
                .torrent_files(hash)
                .await
                .map_err(|e| format!("Failed to verify file priorities: {}", e))?;
            let mismatched: Vec<(usize, bool)> = current
                .iter()
                .filter(|f| f.is_wanted() != wanted.contains(&f.id))
                .map(|f| (f.id, wanted.contains(&f.id)))
                .collect();

            if mismatched.is_empty() {
                return Ok(());
            }
            if attempt == self.settings.verify_attempts {
                break;
            }

            warn!(
                hash = %hash,
                mismatched = mismatched.len(),
                "File priorities did not apply, retrying individually"
            );
            for (id, want) in mismatched {
                if let Err(e) = self.client.set_file_priorities(hash, &[id], want).await {
                    debug!(hash = %hash, file = id, error = %e, "Priority retry failed");
                }
            }
        }

        Err("Failed to apply file priorities".to_string())
    }

    /// Skip locale-marked files. Failures are logged and ignored.
    async fn deselect_russian(&self, hash: &str) {
        let mut files = Vec::new();
        for attempt in 0..self.settings.file_list_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.settings.resolve_delay).await;
            }
            match self.client.torrent_files(hash).await {
                Ok(listed) if !listed.is_empty() => {
                    files = listed;
                    break;
                }
                _ => continue,
            }
        }
        if files.is_empty() {
            return;
        }

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        let keep: HashSet<usize> = without_russian(&basenames(&names))
            .into_iter()
            .map(|idx| files[idx].id)
            .collect();
        // Deselecting everything would leave a torrent that never completes.
        if keep.is_empty() || keep.len() == files.len() {
            return;
        }

        let skip: Vec<usize> = files
            .iter()
            .map(|f| f.id)
            .filter(|id| !keep.contains(id))
            .collect();
        if let Err(e) = self.client.set_file_priorities(hash, &skip, false).await {
            warn!(hash = %hash, error = %e, "Failed to deselect locale-marked files");
        }
    }

    async fn roll_back(&self, hash: &str) {
        metrics::TORRENTS_ROLLED_BACK.inc();
        match self.client.remove_torrent(hash, true).await {
            Ok(()) => info!(hash = %hash, "Removed torrent after failed add"),
            Err(e) => warn!(hash = %hash, error = %e, "Failed to remove torrent after failed add"),
        }
    }

    /// Completed torrents in a category (the configured one by default).
    pub async fn list_completed(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CompletedTorrent>, TorrentClientError> {
        let filters = TorrentFilters::category(category.unwrap_or(&self.settings.category));
        let result = self.client.list_torrents(&filters).await;
        metrics::record_external(self.client.name(), "list", &result);

        Ok(result?
            .into_iter()
            .filter(|t| t.is_complete())
            .filter_map(|t| match t.payload_path() {
                Some(path) => Some(CompletedTorrent {
                    hash: t.hash,
                    path: PathBuf::from(path),
                    name: t.name,
                }),
                None => {
                    warn!(hash = %t.hash, "Completed torrent has no known path");
                    None
                }
            })
            .collect())
    }

    /// Make the daemon forget a torrent. Downloaded data is kept.
    pub async fn remove(&self, hash: &str) -> OpResult {
        let result = self.client.remove_torrent(hash, false).await;
        metrics::record_external(self.client.name(), "remove", &result);
        match result {
            Ok(()) => OpResult::ok(format!("Removed torrent {}", hash)),
            Err(e) => OpResult::fail(format!("Failed to remove torrent {}: {}", hash, e)),
        }
    }

    pub async fn test_connection(&self) -> OpResult {
        match self.client.test_connection().await {
            Ok(version) => OpResult::ok(format!(
                "Connected to {} (version {})",
                self.client.name(),
                version
            )),
            Err(e) => OpResult::fail(format!("Connection to {} failed: {}", self.client.name(), e)),
        }
    }
}

fn basenames<S: AsRef<str>>(paths: &[S]) -> Vec<&str> {
    paths
        .iter()
        .map(|p| {
            let p = p.as_ref();
            p.rsplit(['/', '\\']).next().unwrap_or(p)
        })
        .collect()
}

fn failure_label(outcome: &AddOutcome) -> &'static str {
    if outcome.is_no_match() {
        "no_match"
    } else {
        "error"
    }
}

fn no_match_message(params: &SelectionParams) -> String {
    match params.expected_version.filter(|v| *v > 0) {
        Some(version) => format!("{} (wanted v{})", NO_MATCH_PREFIX, version),
        None => format!("{} in torrent", NO_MATCH_PREFIX),
    }
}
