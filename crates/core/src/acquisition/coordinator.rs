//! Acquisition coordinator implementation.
//!
//! Drives missing updates through search, add and reconcile:
//! - Acquire: one title at a time, guarded by a dedupe key
//! - Reconcile: completed torrents are matched to pending entries (or
//!   treated as orphans), moved into the library and removed from the daemon

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{AcquisitionConfig, Config, ConfigError};
use crate::library::{FsLibrary, Library, MissingUpdate, MoveOutcome};
use crate::metrics;
use crate::searcher::{
    pick_best_result, rank_results, ProwlarrSearcher, RankCriteria, SearchError, SearchResult,
    Searcher,
};
use crate::torrent_client::{create_downloader, AddRequest, CompletedTorrent, Downloader};

use super::query::build_query_variants;
use super::types::{
    AcquisitionError, AcquisitionSnapshot, OpResult, PendingDownload, QueueRequest,
    ReconcileSummary, UpdateOptions,
};

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    /// Periodic tick. Subject to the minimum run interval.
    Scheduled,
    /// Explicit request from a user.
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

/// Dedupe key of an automatic acquisition.
pub fn dedupe_key(title_id: &str, version: u64) -> String {
    format!("{}:{}", title_id, version)
}

#[derive(Debug, Default)]
struct CoordinatorState {
    running: bool,
    last_run: Option<DateTime<Utc>>,
    pending: HashMap<String, PendingDownload>,
    completed: BTreeSet<String>,
    /// Keys with an add or a library move in flight.
    reserved: HashSet<String>,
    /// Download URLs with a manual queue in flight.
    in_flight_urls: HashSet<String>,
    /// Lowercased daemon hashes some reconcile pass is working on.
    claimed: HashSet<String>,
}

impl CoordinatorState {
    fn check_key(&self, key: &str) -> Result<(), AcquisitionError> {
        if self.completed.contains(key) {
            return Err(AcquisitionError::AlreadyCompleted(key.to_string()));
        }
        if self.pending.contains_key(key) || self.reserved.contains(key) {
            return Err(AcquisitionError::AlreadyQueued(key.to_string()));
        }
        Ok(())
    }

    fn next_manual_key(&self, now: DateTime<Utc>) -> String {
        let mut timestamp = now.timestamp_millis();
        loop {
            let key = format!("manual:{}", timestamp);
            if self.check_key(&key).is_ok() {
                return key;
            }
            timestamp += 1;
        }
    }

    /// Pair completed torrents with pending entries and claim everything
    /// that will be processed. Matched entries leave `pending`; their keys
    /// stay reserved until the move finishes.
    fn plan_reconcile(&mut self, completed: Vec<CompletedTorrent>) -> Vec<ReconcileJob> {
        let mut available: Vec<CompletedTorrent> = completed
            .into_iter()
            .filter(|t| !self.claimed.contains(&t.hash.to_lowercase()))
            .collect();

        let mut keys: Vec<(DateTime<Utc>, String)> = self
            .pending
            .values()
            .map(|p| (p.queued_at, p.key.clone()))
            .collect();
        keys.sort();

        let mut matched: Vec<(String, CompletedTorrent)> = Vec::new();

        // Hash matches first, so a name match can never steal a torrent
        // another entry owns by hash.
        keys.retain(|(_, key)| {
            let Some(entry) = self.pending.get(key) else {
                return false;
            };
            match available.iter().position(|t| entry.matches_hash(&t.hash)) {
                Some(idx) => {
                    matched.push((key.clone(), available.remove(idx)));
                    false
                }
                None => true,
            }
        });

        for (_, key) in &keys {
            let Some(entry) = self.pending.get(key) else {
                continue;
            };
            if let Some(idx) = available.iter().position(|t| entry.matches_name(&t.name)) {
                matched.push((key.clone(), available.remove(idx)));
            }
        }

        let mut jobs = Vec::with_capacity(matched.len() + available.len());
        for (key, torrent) in matched {
            if let Some(entry) = self.pending.remove(&key) {
                self.reserved.insert(key);
                jobs.push(ReconcileJob {
                    torrent,
                    pending: Some(entry),
                });
            }
        }
        jobs.extend(available.into_iter().map(|torrent| ReconcileJob {
            torrent,
            pending: None,
        }));

        for job in &jobs {
            self.claimed.insert(job.torrent.hash.to_lowercase());
        }
        jobs
    }
}

#[derive(Debug)]
struct ReconcileJob {
    torrent: CompletedTorrent,
    /// `None` for an orphan.
    pending: Option<PendingDownload>,
}

fn lock(state: &Mutex<CoordinatorState>) -> MutexGuard<'_, CoordinatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the running flag when a run ends, however it ends.
struct RunGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).running = false;
    }
}

/// Holds a dedupe key (and optionally a download URL) while an add is in flight.
struct Reservation<'a> {
    state: &'a Mutex<CoordinatorState>,
    key: String,
    url: Option<String>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.reserved.remove(&self.key);
        if let Some(url) = &self.url {
            state.in_flight_urls.remove(url);
        }
    }
}

/// Releases the hashes and keys claimed by one reconcile pass.
struct Claims<'a> {
    state: &'a Mutex<CoordinatorState>,
    hashes: Vec<String>,
    keys: Vec<String>,
}

impl Drop for Claims<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        for hash in &self.hashes {
            state.claimed.remove(hash);
        }
        for key in &self.keys {
            state.reserved.remove(key);
        }
    }
}

/// Coordinates acquisition of missing updates.
pub struct AcquisitionCoordinator {
    pub(super) config: AcquisitionConfig,
    downloader: Option<Arc<Downloader>>,
    searcher: Option<Arc<dyn Searcher>>,
    indexer_ids: Vec<i64>,
    library: Arc<dyn Library>,
    state: Mutex<CoordinatorState>,
    pub(super) scheduled: AtomicBool,
    pub(super) shutdown_tx: broadcast::Sender<()>,
}

impl AcquisitionCoordinator {
    /// Create a coordinator. A missing downloader or searcher turns the
    /// operations that need them into "not configured" results.
    pub fn new(
        config: AcquisitionConfig,
        downloader: Option<Arc<Downloader>>,
        searcher: Option<Arc<dyn Searcher>>,
        indexer_ids: Vec<i64>,
        library: Arc<dyn Library>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            downloader,
            searcher,
            indexer_ids,
            library,
            state: Mutex::new(CoordinatorState::default()),
            scheduled: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Build the coordinator and its collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let downloader = config
            .torrent_client
            .as_ref()
            .map(create_downloader)
            .transpose()?
            .map(Arc::new);

        let searcher = config
            .indexer
            .clone()
            .map(|indexer| Arc::new(ProwlarrSearcher::new(indexer)) as Arc<dyn Searcher>);

        let indexer_ids = config
            .indexer
            .as_ref()
            .map(|i| i.indexer_ids.clone())
            .unwrap_or_default();

        Ok(Self::new(
            config.acquisition.clone(),
            downloader,
            searcher,
            indexer_ids,
            Arc::new(FsLibrary::new(config.library.clone())),
        ))
    }

    pub fn downloader(&self) -> Option<&Downloader> {
        self.downloader.as_deref()
    }

    pub fn searcher(&self) -> Option<&Arc<dyn Searcher>> {
        self.searcher.as_ref()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut CoordinatorState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    fn require_downloader(&self) -> Result<&Downloader, AcquisitionError> {
        self.downloader
            .as_deref()
            .ok_or(AcquisitionError::NotConfigured("Torrent client"))
    }

    fn require_searcher(&self) -> Result<&dyn Searcher, AcquisitionError> {
        self.searcher
            .as_deref()
            .ok_or(AcquisitionError::NotConfigured("Indexer"))
    }

    fn reserve(&self, key: &str) -> Result<Reservation<'_>, AcquisitionError> {
        self.with_state(|s| s.check_key(key).map(|()| s.reserved.insert(key.to_string())))?;
        Ok(Reservation {
            state: &self.state,
            key: key.to_string(),
            url: None,
        })
    }

    // =========================================================================
    // Scheduler contract
    // =========================================================================

    /// Periodic run: acquire missing updates, then reconcile.
    ///
    /// Safe to call on a timer. Overlapping calls and calls closer than the
    /// minimum run interval return without doing anything.
    pub async fn run(&self) -> OpResult {
        self.run_with(RunTrigger::Scheduled).await
    }

    /// Run now, ignoring the minimum interval (but not an in-progress run).
    pub async fn trigger_run(&self) -> OpResult {
        self.run_with(RunTrigger::Manual).await
    }

    /// Acquire one title outside the periodic run.
    pub async fn run_manual(&self, title_id: &str, version: u64) -> OpResult {
        metrics::ACQUISITION_RUNS
            .with_label_values(&[RunTrigger::Manual.as_str()])
            .inc();
        self.manual_search_update(title_id, version).await
    }

    async fn run_with(&self, trigger: RunTrigger) -> OpResult {
        let downloader = match self.require_downloader() {
            Ok(d) => d,
            Err(e) => {
                debug!("Torrent client not configured; skipping acquisition run");
                return e.into();
            }
        };

        let now = Utc::now();
        let min_interval = self.config.min_run_interval_secs as i64;
        let started = self.with_state(|s| {
            if s.running {
                return Err("Acquisition already running");
            }
            if trigger == RunTrigger::Scheduled {
                if let Some(last) = s.last_run {
                    if (now - last).num_seconds() < min_interval {
                        return Err("Previous run was too recent");
                    }
                }
            }
            s.running = true;
            s.last_run = Some(now);
            Ok(())
        });

        if let Err(reason) = started {
            metrics::ACQUISITION_RUNS.with_label_values(&["skipped"]).inc();
            debug!(trigger = trigger.as_str(), reason, "Skipping acquisition run");
            return OpResult::ok(reason);
        }

        let _guard = RunGuard { state: &self.state };
        metrics::ACQUISITION_RUNS
            .with_label_values(&[trigger.as_str()])
            .inc();
        let timer = metrics::ACQUISITION_DURATION
            .with_label_values(&[])
            .start_timer();

        let queued = self.acquire_missing(downloader).await;

        let result = match self.reconcile(downloader).await {
            Ok(summary) => {
                if queued == 0 && summary.processed() == 0 {
                    debug!("Acquisition run: nothing to do");
                } else {
                    info!(
                        queued,
                        completed = summary.matched,
                        orphans = summary.orphans,
                        moved = summary.moved,
                        failed = summary.failed,
                        "Acquisition run finished"
                    );
                }
                OpResult::ok(format!(
                    "Queued {} download(s), processed {} completed",
                    queued,
                    summary.processed()
                ))
            }
            Err(e) => {
                warn!(error = %e, "Failed to reconcile completed downloads");
                OpResult::fail(format!(
                    "Queued {} download(s); reconcile failed: {}",
                    queued, e
                ))
            }
        };

        timer.observe_duration();
        result
    }

    /// Queue every missing update that is not already known. Returns how
    /// many were queued.
    async fn acquire_missing(&self, downloader: &Downloader) -> usize {
        let Some(searcher) = self.searcher.as_deref() else {
            debug!("Indexer not configured; skipping discovery");
            return 0;
        };

        let missing = match self.library.get_missing_updates().await {
            Ok(missing) => missing,
            Err(e) => {
                warn!(error = %e, "Failed to list missing updates");
                return 0;
            }
        };

        let mut queued = 0;
        for title in &missing {
            let key = dedupe_key(&title.title_id, title.version);
            let _reservation = match self.reserve(&key) {
                Ok(r) => r,
                Err(_) => {
                    metrics::TITLES_PROCESSED
                        .with_label_values(&["duplicate"])
                        .inc();
                    continue;
                }
            };

            match self.acquire_title(downloader, searcher, title, &key).await {
                Ok(pending) => {
                    queued += 1;
                    metrics::TITLES_PROCESSED.with_label_values(&["queued"]).inc();
                    info!(
                        key = %key,
                        hash = pending.torrent_hash.as_deref().unwrap_or("-"),
                        name = pending.expected_name.as_deref().unwrap_or("-"),
                        "Queued update download"
                    );
                }
                Err(AcquisitionError::NoMatch(message)) => {
                    metrics::TITLES_PROCESSED
                        .with_label_values(&["no_result"])
                        .inc();
                    debug!(key = %key, "{}", message);
                }
                Err(e) => {
                    metrics::TITLES_PROCESSED.with_label_values(&["failed"]).inc();
                    warn!(key = %key, error = %e, "Failed to acquire update");
                }
            }
        }
        queued
    }

    fn criteria(&self, title_id: &str, version: u64) -> RankCriteria {
        RankCriteria {
            title_id: title_id.to_string(),
            version: Some(version),
            min_seeders: self.config.min_seeders,
            required_terms: self.config.required_terms.clone(),
            blacklist_terms: self.config.blacklist_terms.clone(),
        }
    }

    async fn search_once(
        &self,
        searcher: &dyn Searcher,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let result = searcher.search(query, &self.indexer_ids).await;
        metrics::record_external(searcher.name(), "search", &result);
        if let Ok(results) = &result {
            metrics::SEARCH_RESULTS
                .with_label_values(&[])
                .observe(results.len() as f64);
        }
        result
    }

    /// Best result of the first query variant that yields one.
    async fn find_best(
        &self,
        searcher: &dyn Searcher,
        title_name: &str,
        criteria: &RankCriteria,
    ) -> Result<SearchResult, AcquisitionError> {
        let mut last_error = None;
        for query in build_query_variants(title_name, &self.config) {
            match self.search_once(searcher, &query).await {
                Ok(results) => {
                    if let Some(best) = pick_best_result(&results, criteria) {
                        debug!(query = %query, title = %best.title, seeders = best.seeders, "Picked result");
                        return Ok(best);
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Search failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => e.into(),
            None => AcquisitionError::NoMatch(format!("No suitable results for '{}'", title_name)),
        })
    }

    /// Search, add restricted to the wanted version, record as pending.
    /// The caller holds the key reservation.
    async fn acquire_title(
        &self,
        downloader: &Downloader,
        searcher: &dyn Searcher,
        title: &MissingUpdate,
        key: &str,
    ) -> Result<PendingDownload, AcquisitionError> {
        let criteria = self.criteria(&title.title_id, title.version);
        let best = self.find_best(searcher, &title.title_name, &criteria).await?;

        let outcome = downloader
            .add(AddRequest {
                download_url: best.download_url.clone(),
                expected_name: Some(best.title.clone()),
                update_only: true,
                exclude_russian: self.config.exclude_russian,
                expected_version: Some(title.version),
                ..Default::default()
            })
            .await;

        if outcome.is_no_match() {
            return Err(AcquisitionError::NoMatch(outcome.message));
        }
        if !outcome.ok {
            return Err(AcquisitionError::AddFailed(outcome.message));
        }

        let pending = PendingDownload {
            key: key.to_string(),
            title_id: Some(title.title_id.clone()),
            expected_version: Some(title.version),
            expected_name: Some(best.title),
            torrent_hash: outcome.hash,
            download_url: best.download_url,
            queued_at: Utc::now(),
        };
        self.with_state(|s| s.pending.insert(pending.key.clone(), pending.clone()));
        Ok(pending)
    }

    /// Title name for a manual request, from the library when it knows it.
    async fn title_name(&self, title_id: &str) -> String {
        match self.library.get_missing_updates().await {
            Ok(missing) => missing
                .into_iter()
                .find(|m| m.title_id.eq_ignore_ascii_case(title_id))
                .map(|m| m.title_name)
                .unwrap_or_else(|| title_id.to_string()),
            Err(e) => {
                debug!(error = %e, "Could not look up title name");
                title_id.to_string()
            }
        }
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Raw indexer search.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, AcquisitionError> {
        let searcher = self.require_searcher()?;
        Ok(self.search_once(searcher, query).await?)
    }

    /// Queue a single download chosen by the user.
    pub async fn queue(&self, request: QueueRequest) -> OpResult {
        let downloader = match self.require_downloader() {
            Ok(d) => d,
            Err(e) => return e.into(),
        };
        let download_url = request.download_url.trim().to_string();
        if download_url.is_empty() {
            return OpResult::fail("download_url is required");
        }

        let reserved = self.with_state(|s| {
            if !request.allow_duplicates {
                let duplicate = s.pending.values().find(|p| {
                    p.download_url == download_url
                        || matches!(
                            (&p.expected_name, &request.expected_name),
                            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
                        )
                });
                if let Some(existing) = duplicate {
                    return Err(AcquisitionError::AlreadyQueued(existing.key.clone()));
                }
                if s.in_flight_urls.contains(&download_url) {
                    return Err(AcquisitionError::AlreadyQueued(download_url.clone()));
                }
            }
            let key = s.next_manual_key(Utc::now());
            s.reserved.insert(key.clone());
            let url = if request.allow_duplicates {
                None
            } else {
                s.in_flight_urls.insert(download_url.clone());
                Some(download_url.clone())
            };
            Ok(Reservation {
                state: &self.state,
                key,
                url,
            })
        });
        let reservation = match reserved {
            Ok(r) => r,
            Err(e) => return e.into(),
        };

        let outcome = downloader
            .add(AddRequest {
                download_url: download_url.clone(),
                expected_name: request.expected_name.clone(),
                update_only: request.update_only,
                exclude_russian: self.config.exclude_russian,
                expected_version: request.expected_version,
                ..Default::default()
            })
            .await;

        if !outcome.ok {
            return OpResult::fail(outcome.message);
        }

        let pending = PendingDownload {
            key: reservation.key.clone(),
            title_id: None,
            expected_version: request.expected_version,
            expected_name: request.expected_name,
            torrent_hash: outcome.hash,
            download_url,
            queued_at: Utc::now(),
        };
        info!(key = %pending.key, hash = pending.torrent_hash.as_deref().unwrap_or("-"), "Queued manual download");
        self.with_state(|s| s.pending.insert(pending.key.clone(), pending));
        OpResult::ok(outcome.message)
    }

    /// Search for one title's update and queue the best result.
    pub async fn manual_search_update(&self, title_id: &str, version: u64) -> OpResult {
        let downloader = match self.require_downloader() {
            Ok(d) => d,
            Err(e) => return e.into(),
        };
        let searcher = match self.require_searcher() {
            Ok(s) => s,
            Err(e) => return e.into(),
        };

        let key = dedupe_key(title_id, version);
        let _reservation = match self.reserve(&key) {
            Ok(r) => r,
            Err(e) => return e.into(),
        };

        let title = MissingUpdate {
            title_id: title_id.to_string(),
            title_name: self.title_name(title_id).await,
            version,
        };

        match self.acquire_title(downloader, searcher, &title, &key).await {
            Ok(pending) => OpResult::ok(format!(
                "Queued '{}'",
                pending.expected_name.as_deref().unwrap_or(&key)
            )),
            Err(e) => e.into(),
        }
    }

    /// All acceptable results for one title's update, best first.
    pub async fn search_update_options(&self, title_id: &str, version: u64) -> UpdateOptions {
        let searcher = match self.require_searcher() {
            Ok(s) => s,
            Err(e) => {
                return UpdateOptions {
                    ok: false,
                    message: e.to_string(),
                    results: Vec::new(),
                }
            }
        };

        let title_name = self.title_name(title_id).await;
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        let mut last_error = None;

        for query in build_query_variants(&title_name, &self.config) {
            match self.search_once(searcher, &query).await {
                Ok(results) => collected.extend(
                    results
                        .into_iter()
                        .filter(|r| seen.insert(r.download_url.clone())),
                ),
                Err(e) => last_error = Some(e),
            }
        }

        if collected.is_empty() {
            if let Some(e) = last_error {
                return UpdateOptions {
                    ok: false,
                    message: AcquisitionError::from(e).to_string(),
                    results: Vec::new(),
                };
            }
        }

        let results = rank_results(&collected, &self.criteria(title_id, version));
        UpdateOptions {
            ok: true,
            message: format!("Found {} option(s) for '{}'", results.len(), title_name),
            results,
        }
    }

    /// Reconcile now.
    pub async fn check_completed(&self) -> OpResult {
        let downloader = match self.require_downloader() {
            Ok(d) => d,
            Err(e) => return e.into(),
        };

        match self.reconcile(downloader).await {
            Ok(summary) if summary.failed > 0 => OpResult::fail(format!(
                "Processed {} completed download(s); {} could not be moved into the library",
                summary.processed(),
                summary.failed
            )),
            Ok(summary) if summary.processed() == 0 => OpResult::ok("No completed downloads"),
            Ok(summary) => OpResult::ok(format!(
                "Processed {} completed download(s), {} moved into the library",
                summary.processed(),
                summary.moved
            )),
            Err(e) => e.into(),
        }
    }

    pub fn state(&self) -> AcquisitionSnapshot {
        self.with_state(|s| {
            let mut pending: Vec<PendingDownload> = s.pending.values().cloned().collect();
            pending.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then_with(|| a.key.cmp(&b.key)));
            AcquisitionSnapshot {
                running: s.running,
                last_run: s.last_run,
                pending,
                completed: s.completed.iter().cloned().collect(),
            }
        })
    }

    // =========================================================================
    // Reconcile
    // =========================================================================

    /// Move completed torrents into the library and forget them.
    ///
    /// Concurrent passes split the work: each torrent is claimed by exactly
    /// one pass and each pending entry is popped by exactly one pass.
    pub async fn reconcile(
        &self,
        downloader: &Downloader,
    ) -> Result<ReconcileSummary, AcquisitionError> {
        let completed = downloader.list_completed(None).await?;
        let mut summary = ReconcileSummary::default();
        if completed.is_empty() {
            return Ok(summary);
        }

        let jobs = self.with_state(|s| s.plan_reconcile(completed));
        let _claims = Claims {
            state: &self.state,
            hashes: jobs.iter().map(|j| j.torrent.hash.to_lowercase()).collect(),
            keys: jobs
                .iter()
                .filter_map(|j| j.pending.as_ref().map(|p| p.key.clone()))
                .collect(),
        };

        for job in jobs {
            self.finish(downloader, job, &mut summary).await;
        }

        if summary.moved > 0 {
            if let Err(e) = self.library.notify_library_changed().await {
                warn!(error = %e, "Failed to notify library of new files");
            }
        }

        Ok(summary)
    }

    async fn finish(&self, downloader: &Downloader, job: ReconcileJob, summary: &mut ReconcileSummary) {
        let ReconcileJob { torrent, pending } = job;

        match self.library.move_into_library(&torrent.path).await {
            Ok(MoveOutcome::Moved(destination)) => {
                summary.moved += 1;
                metrics::LIBRARY_MOVES.with_label_values(&["moved"]).inc();
                info!(hash = %torrent.hash, destination = %destination.display(), "Moved download into library");
            }
            Ok(MoveOutcome::AlreadyPresent(destination)) => {
                metrics::LIBRARY_MOVES
                    .with_label_values(&["already_present"])
                    .inc();
                info!(hash = %torrent.hash, destination = %destination.display(), "Download already in library");
            }
            Ok(MoveOutcome::SourceMissing) => {
                debug!(hash = %torrent.hash, path = %torrent.path.display(), "Payload already gone");
            }
            Err(e) => {
                summary.failed += 1;
                metrics::LIBRARY_MOVES.with_label_values(&["failed"]).inc();
                warn!(hash = %torrent.hash, error = %e, "Failed to move download into library");
                // Leave the torrent in the daemon and retry next pass.
                if let Some(entry) = pending {
                    self.with_state(|s| s.pending.insert(entry.key.clone(), entry));
                }
                return;
            }
        }

        let removed = downloader.remove(&torrent.hash).await;
        if !removed.ok {
            warn!(hash = %torrent.hash, "{}", removed.message);
        }

        match pending {
            Some(entry) => {
                summary.matched += 1;
                metrics::DOWNLOADS_COMPLETED.inc();
                info!(key = %entry.key, hash = %torrent.hash, "Download complete");
                self.with_state(|s| s.completed.insert(entry.key));
            }
            None => {
                summary.orphans += 1;
                metrics::ORPHANS_PROCESSED.inc();
                info!(hash = %torrent.hash, name = %torrent.name, "Processed orphaned completed download");
            }
        }
    }
}
