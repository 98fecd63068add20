//! Acquisition coordinator lifecycle integration tests.
//!
//! These tests verify the complete flow through the coordinator:
//! missing -> queued (pending) -> completed at the daemon -> moved -> completed key

use std::sync::Arc;
use std::time::Duration;

use acquirer_core::config::AcquisitionConfig;
use acquirer_core::testing::{
    fixtures, MockLibrary, MockSearcher, MockTorrentClient, MockTorrentSpec,
};
use acquirer_core::torrent_client::{Downloader, DownloaderSettings, TorrentClient};
use acquirer_core::{AcquisitionCoordinator, Library, QueueRequest, Searcher};

const TITLE_ID: &str = "0100ABCD00010000";
const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn magnet(hash: &str) -> String {
    format!("magnet:?xt=urn:btih:{}", hash)
}

/// Test helper holding the mocks behind a coordinator.
struct TestHarness {
    client: Arc<MockTorrentClient>,
    searcher: Arc<MockSearcher>,
    library: Arc<MockLibrary>,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            client: Arc::new(MockTorrentClient::reporting_hash()),
            searcher: Arc::new(MockSearcher::new()),
            library: Arc::new(MockLibrary::new()),
        }
    }

    fn downloader(&self) -> Arc<Downloader> {
        Arc::new(Downloader::new(
            Arc::clone(&self.client) as Arc<dyn TorrentClient>,
            DownloaderSettings {
                category: "updates".to_string(),
                download_path: None,
                timeout: Duration::from_secs(2),
                resolve_attempts: 3,
                resolve_delay: Duration::from_millis(10),
                file_list_attempts: 3,
                verify_attempts: 2,
            },
        ))
    }

    fn config() -> AcquisitionConfig {
        AcquisitionConfig {
            enabled: true,
            interval_secs: 1,
            min_run_interval_secs: 0,
            ..Default::default()
        }
    }

    fn coordinator(&self) -> Arc<AcquisitionCoordinator> {
        Arc::new(AcquisitionCoordinator::new(
            Self::config(),
            Some(self.downloader()),
            Some(Arc::clone(&self.searcher) as Arc<dyn Searcher>),
            vec![3],
            Arc::clone(&self.library) as Arc<dyn Library>,
        ))
    }

    /// One missing title whose single search result is an update pack.
    async fn stage_missing_title(&self) {
        self.library
            .set_missing(vec![fixtures::missing_update(TITLE_ID, "Super Game™", 65536)])
            .await;
        self.searcher
            .set_results(vec![fixtures::search_result_at(
                "Super Game [0100ABCD00010000][v65536] Update NSP",
                20,
                &magnet(HASH_A),
            )])
            .await;
        self.client
            .stage_add(MockTorrentSpec::new(
                HASH_A,
                "Super Game Update",
                &["Super Game [v0].nsp", "Super Game [v65536].nsp"],
            ))
            .await;
    }
}

#[tokio::test]
async fn test_run_queues_then_reconciles() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    let coordinator = harness.coordinator();

    let result = coordinator.run().await;
    assert!(result.ok, "{}", result.message);

    let state = coordinator.state();
    assert!(!state.running);
    assert!(state.last_run.is_some());
    assert_eq!(state.pending.len(), 1);
    assert_eq!(state.pending[0].key, "0100ABCD00010000:65536");
    assert_eq!(state.pending[0].torrent_hash.as_deref(), Some(HASH_A));
    assert_eq!(harness.client.wanted_files(HASH_A).await, vec![1]);

    // Queries: cleaned name first, then the "update" fallback is never needed.
    let searches = harness.searcher.recorded_searches().await;
    assert_eq!(searches[0].query, "Super Game");
    assert_eq!(searches[0].indexer_ids, vec![3]);

    // Still downloading: a second run neither re-queues nor moves anything.
    assert!(coordinator.run().await.ok);
    assert_eq!(harness.client.added_torrents().await.len(), 1);
    assert!(harness.library.move_attempts().await.is_empty());

    harness.client.set_complete(HASH_A).await;
    let result = coordinator.check_completed().await;
    assert!(result.ok, "{}", result.message);

    let state = coordinator.state();
    assert!(state.pending.is_empty());
    assert_eq!(state.completed, vec!["0100ABCD00010000:65536"]);
    assert!(harness.library.contains("Super Game Update").await);
    assert_eq!(harness.library.notification_count(), 1);
    let removals = harness.client.removals().await;
    assert_eq!(removals.len(), 1);
    assert!(!removals[0].delete_files);

    // The library has not rescanned yet, so the title is still "missing";
    // the completed key keeps it from being queued again.
    assert!(coordinator.run().await.ok);
    assert_eq!(harness.client.added_torrents().await.len(), 1);
}

#[tokio::test]
async fn test_falls_back_to_update_query() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    harness
        .searcher
        .set_query_handler(|q| (!q.ends_with("update")).then(Vec::new))
        .await;
    let coordinator = harness.coordinator();

    assert!(coordinator.run().await.ok);

    let queries: Vec<String> = harness
        .searcher
        .recorded_searches()
        .await
        .into_iter()
        .map(|s| s.query)
        .collect();
    assert_eq!(queries, vec!["Super Game", "Super Game update"]);
    assert_eq!(coordinator.state().pending.len(), 1);
}

#[tokio::test]
async fn test_manual_search_update_dedupes() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    let coordinator = harness.coordinator();

    let first = coordinator.manual_search_update(TITLE_ID, 65536).await;
    assert!(first.ok, "{}", first.message);

    let second = coordinator.manual_search_update(TITLE_ID, 65536).await;
    assert!(!second.ok);
    assert!(second.message.contains("Already queued"));
    assert_eq!(harness.client.added_torrents().await.len(), 1);

    // The automatic run respects the same key.
    assert!(coordinator.run().await.ok);
    assert_eq!(harness.client.added_torrents().await.len(), 1);
}

#[tokio::test]
async fn test_queue_rejects_duplicates_unless_allowed() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();
    let request = QueueRequest {
        download_url: magnet(HASH_B),
        expected_name: Some("Manual Game".to_string()),
        ..Default::default()
    };

    let first = coordinator.queue(request.clone()).await;
    assert!(first.ok, "{}", first.message);

    let second = coordinator.queue(request.clone()).await;
    assert!(!second.ok);
    assert!(second.message.contains("Already queued"));

    let forced = coordinator
        .queue(QueueRequest {
            allow_duplicates: true,
            ..request
        })
        .await;
    assert!(forced.ok, "{}", forced.message);

    let state = coordinator.state();
    assert_eq!(state.pending.len(), 2);
    assert!(state.pending.iter().all(|p| p.key.starts_with("manual:")));
    assert_ne!(state.pending[0].key, state.pending[1].key);
}

#[tokio::test]
async fn test_queue_requires_url() {
    let harness = TestHarness::new();
    let result = harness.coordinator().queue(QueueRequest::default()).await;
    assert!(!result.ok);
    assert_eq!(result.message, "download_url is required");
}

#[tokio::test]
async fn test_reconcile_handles_orphans_idempotently() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();

    // A manual queue matched by name, plus a completed torrent nobody queued
    // in this process (e.g. from before a restart).
    harness
        .client
        .stage_add(MockTorrentSpec::new(HASH_B, "[Group] Manual Game v65536", &[]))
        .await;
    let queued = coordinator
        .queue(QueueRequest {
            download_url: magnet(HASH_B),
            expected_name: Some("manual game".to_string()),
            ..Default::default()
        })
        .await;
    assert!(queued.ok);
    harness
        .client
        .insert_torrent(MockTorrentSpec::new("orphan", "Orphan Pack", &[]), "updates")
        .await;
    harness.client.set_complete(HASH_B).await;
    harness.client.set_complete("orphan").await;

    // Two passes at once must not move anything twice.
    let (a, b) = tokio::join!(coordinator.check_completed(), coordinator.check_completed());
    assert!(a.ok && b.ok);

    assert_eq!(harness.library.move_attempts().await.len(), 2);
    assert_eq!(harness.client.removals().await.len(), 2);
    assert!(harness.library.contains("Orphan Pack").await);
    assert!(harness.library.contains("[Group] Manual Game v65536").await);

    let state = coordinator.state();
    assert!(state.pending.is_empty());
    assert_eq!(state.completed.len(), 1);

    let again = coordinator.check_completed().await;
    assert_eq!(again.message, "No completed downloads");
    assert_eq!(harness.library.move_attempts().await.len(), 2);
}

#[tokio::test]
async fn test_failed_move_keeps_pending_entry() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    let coordinator = harness.coordinator();
    assert!(coordinator.run().await.ok);

    harness.client.set_complete(HASH_A).await;
    harness.library.fail_next_moves(1).await;

    let result = coordinator.check_completed().await;
    assert!(!result.ok);
    assert_eq!(coordinator.state().pending.len(), 1);
    assert!(harness.client.removals().await.is_empty());
    assert_eq!(harness.library.notification_count(), 0);

    let retry = coordinator.check_completed().await;
    assert!(retry.ok, "{}", retry.message);
    let state = coordinator.state();
    assert!(state.pending.is_empty());
    assert_eq!(state.completed.len(), 1);
}

#[tokio::test]
async fn test_already_present_payload_is_not_notified() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    let coordinator = harness.coordinator();
    assert!(coordinator.run().await.ok);

    harness.library.add_existing("Super Game Update").await;
    harness.client.set_complete(HASH_A).await;

    assert!(coordinator.check_completed().await.ok);
    assert_eq!(coordinator.state().completed.len(), 1);
    assert_eq!(harness.client.removals().await.len(), 1);
    assert_eq!(harness.library.notification_count(), 0);
}

#[tokio::test]
async fn test_update_only_failure_leaves_nothing_behind() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    // Replace the staged torrent with one lacking the wanted version.
    let harness = TestHarness {
        client: Arc::new(MockTorrentClient::reporting_hash()),
        ..harness
    };
    harness
        .client
        .stage_add(MockTorrentSpec::new(HASH_A, "Super Game Update", &["Super Game [v0].nsp"]))
        .await;
    let coordinator = harness.coordinator();

    assert!(coordinator.run().await.ok);

    assert!(coordinator.state().pending.is_empty());
    assert_eq!(harness.client.torrent_count().await, 0);
    let removals = harness.client.removals().await;
    assert_eq!(removals.len(), 1);
    assert!(removals[0].delete_files);

    // Not a completed key: the next run tries again.
    harness
        .client
        .stage_add(MockTorrentSpec::new(
            HASH_A,
            "Super Game Update",
            &["Super Game [v65536].nsp"],
        ))
        .await;
    assert!(coordinator.run().await.ok);
    assert_eq!(coordinator.state().pending.len(), 1);
}

#[tokio::test]
async fn test_run_without_daemon_is_a_no_op() {
    let harness = TestHarness::new();
    harness.stage_missing_title().await;
    let coordinator = AcquisitionCoordinator::new(
        TestHarness::config(),
        None,
        Some(Arc::clone(&harness.searcher) as Arc<dyn Searcher>),
        vec![],
        Arc::clone(&harness.library) as Arc<dyn Library>,
    );

    let result = coordinator.run().await;
    assert!(!result.ok);
    assert_eq!(result.message, "Torrent client not configured");
    assert_eq!(harness.searcher.search_count().await, 0);
    assert!(coordinator.state().last_run.is_none());

    let queued = coordinator
        .queue(QueueRequest {
            download_url: magnet(HASH_B),
            ..Default::default()
        })
        .await;
    assert!(!queued.ok);
}

#[tokio::test]
async fn test_run_without_indexer_still_reconciles() {
    let harness = TestHarness::new();
    harness
        .client
        .insert_torrent(MockTorrentSpec::new("orphan", "Orphan Pack", &[]), "updates")
        .await;
    harness.client.set_complete("orphan").await;
    let coordinator = AcquisitionCoordinator::new(
        TestHarness::config(),
        Some(harness.downloader()),
        None,
        vec![],
        Arc::clone(&harness.library) as Arc<dyn Library>,
    );

    assert!(coordinator.run().await.ok);
    assert!(harness.library.contains("Orphan Pack").await);

    let options = coordinator.search_update_options(TITLE_ID, 65536).await;
    assert!(!options.ok);
    assert_eq!(options.message, "Indexer not configured");
}

#[tokio::test]
async fn test_min_run_interval_skips_scheduled_runs() {
    let harness = TestHarness::new();
    let coordinator = AcquisitionCoordinator::new(
        AcquisitionConfig {
            min_run_interval_secs: 3600,
            ..TestHarness::config()
        },
        Some(harness.downloader()),
        Some(Arc::clone(&harness.searcher) as Arc<dyn Searcher>),
        vec![],
        Arc::clone(&harness.library) as Arc<dyn Library>,
    );

    assert!(coordinator.run().await.ok);
    let first = coordinator.state().last_run;

    let skipped = coordinator.run().await;
    assert_eq!(skipped.message, "Previous run was too recent");
    assert_eq!(coordinator.state().last_run, first);

    // An explicit trigger ignores the interval.
    let manual = coordinator.trigger_run().await;
    assert_ne!(manual.message, "Previous run was too recent");
    assert!(coordinator.state().last_run >= first);
}

#[tokio::test]
async fn test_search_update_options_ranks_all_variants() {
    let harness = TestHarness::new();
    harness
        .library
        .set_missing(vec![fixtures::missing_update(TITLE_ID, "Super Game", 65536)])
        .await;
    harness
        .searcher
        .set_query_handler(|q| {
            if q.ends_with("update") {
                Some(vec![
                    fixtures::search_result("Super Game 0100ABCD00010000 v65536 Update", 5),
                    fixtures::search_result("Super Game", 0),
                ])
            } else {
                Some(vec![fixtures::search_result("Super Game v65536", 50)])
            }
        })
        .await;

    let options = harness
        .coordinator()
        .search_update_options(TITLE_ID, 65536)
        .await;

    assert!(options.ok);
    let titles: Vec<&str> = options.results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Super Game 0100ABCD00010000 v65536 Update", "Super Game v65536"]
    );
}

#[tokio::test]
async fn test_scheduler_runs_and_stops() {
    let harness = TestHarness::new();
    let coordinator = harness.coordinator();

    coordinator.start();
    assert!(coordinator.is_scheduled());

    // The first tick fires immediately.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(coordinator.state().last_run.is_some());

    coordinator.stop();
    assert!(!coordinator.is_scheduled());
}
