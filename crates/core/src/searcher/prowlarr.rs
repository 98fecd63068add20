//! Prowlarr search backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::IndexerConfig;

use super::{IndexerInfo, SearchError, SearchResult, Searcher, SystemStatus};

/// Prowlarr search backend implementation.
pub struct ProwlarrSearcher {
    client: Client,
    config: IndexerConfig,
}

impl ProwlarrSearcher {
    /// Create a new ProwlarrSearcher with the given configuration.
    pub fn new(config: IndexerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Build the search URL. Indexer ids repeat the `indexerIds` key.
    fn build_search_url(&self, query: &str, indexer_ids: &[i64]) -> String {
        let mut url = format!(
            "{}/api/v1/search?query={}&type=search",
            self.base_url(),
            urlencoding::encode(query)
        );
        for id in indexer_ids {
            url.push_str(&format!("&indexerIds={}", id));
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SearchError> {
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Searcher for ProwlarrSearcher {
    fn name(&self) -> &str {
        "prowlarr"
    }

    async fn system_status(&self) -> Result<SystemStatus, SearchError> {
        let url = format!("{}/api/v1/system/status", self.base_url());
        let status: ProwlarrStatus = self.get_json(&url).await?;
        Ok(SystemStatus {
            app_name: status.app_name.unwrap_or_else(|| "Prowlarr".to_string()),
            version: status.version,
        })
    }

    async fn list_indexers(&self) -> Result<Vec<IndexerInfo>, SearchError> {
        let url = format!("{}/api/v1/indexer", self.base_url());
        let indexers: Vec<ProwlarrIndexer> = self.get_json(&url).await?;
        Ok(indexers
            .into_iter()
            .map(|i| IndexerInfo {
                id: i.id,
                name: i.name,
                enabled: i.enable,
                protocol: i.protocol,
            })
            .collect())
    }

    async fn search(
        &self,
        query: &str,
        indexer_ids: &[i64],
    ) -> Result<Vec<SearchResult>, SearchError> {
        let url = self.build_search_url(query, indexer_ids);
        debug!(query = query, indexers = ?indexer_ids, "Searching Prowlarr");

        let results: Vec<ProwlarrResult> = self.get_json(&url).await?;
        let normalized: Vec<SearchResult> = results
            .into_iter()
            .filter_map(ProwlarrResult::into_search_result)
            .collect();

        debug!(query = query, results = normalized.len(), "Prowlarr search complete");
        Ok(normalized)
    }
}

// Prowlarr API response types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProwlarrStatus {
    app_name: Option<String>,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ProwlarrIndexer {
    id: i64,
    name: String,
    #[serde(default)]
    enable: bool,
    #[serde(default)]
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProwlarrResult {
    title: String,
    #[serde(default)]
    size: Option<i64>,
    #[serde(default)]
    seeders: Option<i64>,
    #[serde(default)]
    leechers: Option<i64>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    magnet_url: Option<String>,
    #[serde(default)]
    info_url: Option<String>,
    #[serde(default)]
    indexer_id: i64,
}

impl ProwlarrResult {
    /// Results without any way to download them are dropped.
    fn into_search_result(self) -> Option<SearchResult> {
        let download_url = self
            .download_url
            .filter(|u| !u.is_empty())
            .or(self.magnet_url.filter(|u| !u.is_empty()))?;

        Some(SearchResult {
            title: self.title,
            size: self.size.unwrap_or(0).max(0) as u64,
            seeders: self.seeders.unwrap_or(0).clamp(0, u32::MAX as i64) as u32,
            leechers: self.leechers.unwrap_or(0).clamp(0, u32::MAX as i64) as u32,
            download_url,
            info_url: self.info_url,
            indexer_id: self.indexer_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> IndexerConfig {
        IndexerConfig {
            url: url.to_string(),
            api_key: "test-key".to_string(),
            timeout_secs: 5,
            indexer_ids: vec![],
        }
    }

    #[test]
    fn test_build_search_url() {
        let searcher = ProwlarrSearcher::new(config("http://localhost:9696/"));
        let url = searcher.build_search_url("Some Game update", &[1, 7]);
        assert!(url.starts_with("http://localhost:9696/api/v1/search?"));
        assert!(url.contains("query=Some%20Game%20update"));
        assert!(url.contains("&indexerIds=1&indexerIds=7"));
    }

    #[test]
    fn test_result_without_download_link_is_dropped() {
        let raw = ProwlarrResult {
            title: "x".to_string(),
            size: Some(1),
            seeders: Some(1),
            leechers: Some(0),
            download_url: None,
            magnet_url: Some(String::new()),
            info_url: None,
            indexer_id: 1,
        };
        assert!(raw.into_search_result().is_none());
    }

    #[test]
    fn test_result_falls_back_to_magnet() {
        let raw = ProwlarrResult {
            title: "x".to_string(),
            size: Some(-5),
            seeders: Some(-1),
            leechers: None,
            download_url: None,
            magnet_url: Some("magnet:?xt=urn:btih:abc".to_string()),
            info_url: None,
            indexer_id: 2,
        };
        let result = raw.into_search_result().unwrap();
        assert_eq!(result.download_url, "magnet:?xt=urn:btih:abc");
        assert_eq!(result.size, 0);
        assert_eq!(result.seeders, 0);
    }

    #[tokio::test]
    async fn test_search_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/search"))
            .and(query_param("query", "Game"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "title": "Game [v65536] Update",
                    "size": 2048,
                    "seeders": 12,
                    "leechers": 3,
                    "downloadUrl": "http://prowlarr/dl/1",
                    "infoUrl": "http://tracker/t/1",
                    "indexerId": 4
                }
            ])))
            .mount(&server)
            .await;

        let searcher = ProwlarrSearcher::new(config(&server.uri()));
        let results = searcher.search("Game", &[]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].seeders, 12);
        assert_eq!(results[0].indexer_id, 4);
        assert_eq!(results[0].info_url.as_deref(), Some("http://tracker/t/1"));
    }

    #[tokio::test]
    async fn test_non_success_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/indexer"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let searcher = ProwlarrSearcher::new(config(&server.uri()));
        let err = searcher.list_indexers().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_system_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/system/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"appName": "Prowlarr", "version": "1.20.0"})),
            )
            .mount(&server)
            .await;

        let searcher = ProwlarrSearcher::new(config(&server.uri()));
        let status = searcher.system_status().await.unwrap();
        assert_eq!(status.version, "1.20.0");
    }
}
