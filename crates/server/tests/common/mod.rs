//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock dependencies injected, enabling comprehensive E2E testing
//! without external infrastructure.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use acquirer_core::config::AcquisitionConfig;
use acquirer_core::testing::{MockLibrary, MockSearcher, MockTorrentClient};
use acquirer_core::torrent_client::{Downloader, DownloaderSettings};
use acquirer_core::{AcquisitionCoordinator, Config, Library, Searcher, TorrentClient};
use acquirer_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use acquirer_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Indexer search (MockSearcher)
/// - Torrent daemon (MockTorrentClient)
/// - Content library (MockLibrary)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_queue() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/acquisition/queue", json!({
///         "download_url": "magnet:?xt=urn:btih:..."
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock searcher - configure search results
    pub searcher: Arc<MockSearcher>,
    /// Mock torrent client - control downloads
    pub torrent_client: Arc<MockTorrentClient>,
    /// Mock library - missing updates and moves
    pub library: Arc<MockLibrary>,
    /// Coordinator behind the router
    pub coordinator: Arc<AcquisitionCoordinator>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with every dependency configured.
    pub fn new() -> Self {
        Self::with_config(TestConfig::default())
    }

    /// Create a test fixture with custom configuration.
    pub fn with_config(test_config: TestConfig) -> Self {
        let searcher = Arc::new(MockSearcher::new());
        let torrent_client = Arc::new(MockTorrentClient::reporting_hash());
        let library = Arc::new(MockLibrary::new());

        let downloader = (!test_config.without_client).then(|| {
            Arc::new(Downloader::new(
                Arc::clone(&torrent_client) as Arc<dyn TorrentClient>,
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
        });
        let indexer = (!test_config.without_indexer)
            .then(|| Arc::clone(&searcher) as Arc<dyn Searcher>);

        let coordinator = Arc::new(AcquisitionCoordinator::new(
            AcquisitionConfig {
                min_run_interval_secs: 0,
                ..Default::default()
            },
            downloader,
            indexer,
            Vec::new(),
            Arc::clone(&library) as Arc<dyn Library>,
        ));

        let state = Arc::new(AppState::new(Config::default(), Arc::clone(&coordinator)));
        let router = create_router(state);

        Self {
            router,
            searcher,
            torrent_client,
            library,
            coordinator,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Leave the torrent client out of the coordinator
    pub without_client: bool,
    /// Leave the indexer out of the coordinator
    pub without_indexer: bool,
}

impl TestConfig {
    /// Neither daemon nor indexer configured.
    pub fn bare() -> Self {
        Self {
            without_client: true,
            without_indexer: true,
        }
    }
}
