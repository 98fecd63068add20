//! qBittorrent Web API client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::types::sort_recent_first;
use super::{
    AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError, TorrentFileEntry,
    TorrentFilters, TorrentInfo, TorrentState,
};

/// qBittorrent client implementation.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    /// Session marker (the SID cookie itself lives in the cookie jar).
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentClient {
    /// Create a new qBittorrent client.
    pub fn new(config: QBittorrentConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Login and store session cookie.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let url = self.endpoint("/api/v2/auth/login");

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Referer", self.base_url())
            .form(&params)
            .send()
            .await
            .map_err(TorrentClientError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            let mut session = self.session.write().await;
            *session = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(TorrentClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(TorrentClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    /// Ensure we have a valid session, logging in if needed.
    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    /// Send an authenticated request, logging in again once on HTTP 403.
    ///
    /// `build` is called per attempt because multipart bodies cannot be
    /// replayed.
    async fn execute<F>(&self, build: F) -> Result<(StatusCode, String), TorrentClientError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        self.ensure_authenticated().await?;

        let response = build()
            .send()
            .await
            .map_err(TorrentClientError::from_reqwest)?;

        let response = if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            {
                let mut session = self.session.write().await;
                *session = None;
            }
            self.login().await?;

            build()
                .send()
                .await
                .map_err(TorrentClientError::from_reqwest)?
        } else {
            response
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TorrentClientError::ApiError(e.to_string()))?;
        Ok((status, body))
    }

    /// Make an authenticated GET request.
    async fn get(&self, path: &str) -> Result<String, TorrentClientError> {
        let url = self.endpoint(path);
        let (status, body) = self.execute(|| self.client.get(&url)).await?;
        ensure_success(status, body)
    }

    /// Make an authenticated POST request with form data.
    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<String, TorrentClientError> {
        let url = self.endpoint(path);
        let (status, body) = self
            .execute(|| self.client.post(&url).form(params))
            .await?;
        ensure_success(status, body)
    }

    fn add_form(&self, request: &AddTorrentRequest) -> multipart::Form {
        let mut form = multipart::Form::new().text("urls", request.url.clone());

        if let Some(path) = &request.download_path {
            form = form.text("savepath", path.clone());
        }
        if let Some(cat) = &request.category {
            form = form.text("category", cat.clone());
        }
        if let Some(tag) = &request.tag {
            form = form.text("tags", tag.clone());
        }
        if request.paused {
            // "paused" before 5.0, "stopped" after.
            form = form.text("paused", "true").text("stopped", "true");
        }
        form
    }
}

fn ensure_success(status: StatusCode, body: String) -> Result<String, TorrentClientError> {
    if status == StatusCode::NOT_FOUND {
        return Err(TorrentClientError::TorrentNotFound(body));
    }
    if !status.is_success() {
        return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
    }
    Ok(body)
}

/// qBittorrent torrent info response.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    content_path: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    tags: String,
}

impl QBTorrentInfo {
    fn into_torrent_info(self) -> TorrentInfo {
        TorrentInfo {
            hash: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            save_path: non_empty(self.save_path),
            content_path: non_empty(self.content_path),
            category: non_empty(self.category),
            tags: self
                .tags
                .split(',')
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
            added_at: timestamp_to_datetime(self.added_on),
        }
    }
}

/// qBittorrent file entry response.
#[derive(Debug, Deserialize)]
struct QBFile {
    /// Present since Web API 2.8.2; older versions use the position.
    #[serde(default)]
    index: Option<usize>,
    name: String,
    #[serde(default)]
    priority: i64,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse qBittorrent state string to TorrentState.
fn parse_qb_state(state: &str) -> TorrentState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "forcedMetaDL" | "allocating" => {
            TorrentState::Downloading
        }
        "uploading" | "forcedUP" => TorrentState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TorrentState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TorrentState::Checking,
        "queuedDL" | "queuedUP" => TorrentState::Queued,
        "stalledDL" | "stalledUP" => TorrentState::Stalled,
        "error" | "missingFiles" => TorrentState::Error,
        _ => TorrentState::Unknown,
    }
}

/// Convert Unix timestamp to DateTime<Utc>.
fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn test_connection(&self) -> Result<String, TorrentClientError> {
        let version = self.get("/api/v2/app/version").await?;
        Ok(version.trim().to_string())
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let url = self.endpoint("/api/v2/torrents/add");
        let (status, body) = self
            .execute(|| self.client.post(&url).multipart(self.add_form(&request)))
            .await?;
        let body = ensure_success(status, body)?;

        if body.contains("Fails.") {
            return Err(TorrentClientError::InvalidTorrent(
                "qBittorrent rejected the torrent (duplicate or invalid)".to_string(),
            ));
        }

        // The hash is not reported; callers resolve it from the listing.
        Ok(AddTorrentResult { hash: None })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let mut endpoint = "/api/v2/torrents/info?sort=added_on&reverse=true".to_string();

        if let Some(category) = &filters.category {
            endpoint.push_str(&format!("&category={}", urlencoding::encode(category)));
        }
        if let Some(tag) = &filters.tag {
            endpoint.push_str(&format!("&tag={}", urlencoding::encode(tag)));
        }

        let response = self.get(&endpoint).await?;
        let torrents: Vec<QBTorrentInfo> = serde_json::from_str(&response)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        let mut results: Vec<TorrentInfo> =
            torrents.into_iter().map(|t| t.into_torrent_info()).collect();
        sort_recent_first(&mut results);
        Ok(results)
    }

    async fn torrent_files(&self, hash: &str) -> Result<Vec<TorrentFileEntry>, TorrentClientError> {
        let endpoint = format!("/api/v2/torrents/files?hash={}", hash.to_lowercase());
        let response = self.get(&endpoint).await?;
        let files: Vec<QBFile> = serde_json::from_str(&response)
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(files
            .into_iter()
            .enumerate()
            .map(|(pos, f)| TorrentFileEntry {
                id: f.index.unwrap_or(pos),
                name: f.name,
                priority: f.priority,
            })
            .collect())
    }

    async fn set_file_priorities(
        &self,
        hash: &str,
        file_ids: &[usize],
        wanted: bool,
    ) -> Result<(), TorrentClientError> {
        if file_ids.is_empty() {
            return Ok(());
        }
        let hash_lower = hash.to_lowercase();
        let ids = file_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let priority = if wanted { "1" } else { "0" };

        self.post_form(
            "/api/v2/torrents/filePrio",
            &[("hash", &hash_lower), ("id", &ids), ("priority", priority)],
        )
        .await?;
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        match self
            .post_form("/api/v2/torrents/resume", &[("hashes", &hash_lower)])
            .await
        {
            // Renamed to "start" in qBittorrent 5.0.
            Err(TorrentClientError::TorrentNotFound(_)) => {
                self.post_form("/api/v2/torrents/start", &[("hashes", &hash_lower)])
                    .await?;
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        let delete_str = if delete_files { "true" } else { "false" };

        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", &hash_lower), ("deleteFiles", delete_str)],
        )
        .await?;

        Ok(())
    }

    async fn remove_tag(&self, hash: &str, tag: &str) -> Result<(), TorrentClientError> {
        let hash_lower = hash.to_lowercase();
        self.post_form(
            "/api/v2/torrents/removeTags",
            &[("hashes", &hash_lower), ("tags", tag)],
        )
        .await?;
        // Tags are global in qBittorrent; drop the now-unused one too.
        self.post_form("/api/v2/torrents/deleteTags", &[("tags", tag)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(url: &str) -> QBittorrentClient {
        QBittorrentClient::new(
            QBittorrentConfig {
                url: url.to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
            },
            Duration::from_secs(5),
        )
    }

    async fn mount_login(server: &MockServer, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_qb_state() {
        assert_eq!(parse_qb_state("downloading"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("metaDL"), TorrentState::Downloading);
        assert_eq!(parse_qb_state("uploading"), TorrentState::Seeding);
        assert_eq!(parse_qb_state("stoppedDL"), TorrentState::Paused);
        assert_eq!(parse_qb_state("checkingResumeData"), TorrentState::Checking);
        assert_eq!(parse_qb_state("queuedUP"), TorrentState::Queued);
        assert_eq!(parse_qb_state("stalledDL"), TorrentState::Stalled);
        assert_eq!(parse_qb_state("missingFiles"), TorrentState::Error);
        assert_eq!(parse_qb_state("something_else"), TorrentState::Unknown);
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let dt = timestamp_to_datetime(1703980800).unwrap();
        assert_eq!(dt.year(), 2023);
        assert!(timestamp_to_datetime(-1).is_none());
        assert!(timestamp_to_datetime(0).is_none());
    }

    #[test]
    fn test_qb_torrent_info_conversion() {
        let qb_info = QBTorrentInfo {
            hash: "ABC123".to_string(),
            name: "Game Pack".to_string(),
            state: "pausedDL".to_string(),
            progress: 0.5,
            size: 1000000,
            added_on: 1703980800,
            save_path: "/downloads".to_string(),
            content_path: String::new(),
            category: "title-updates".to_string(),
            tags: "acq-1, other".to_string(),
        };

        let info = qb_info.into_torrent_info();
        assert_eq!(info.hash, "abc123");
        assert_eq!(info.state, TorrentState::Paused);
        assert_eq!(info.content_path, None);
        assert_eq!(info.tags, vec!["acq-1".to_string(), "other".to_string()]);
        assert_eq!(info.category.as_deref(), Some("title-updates"));
    }

    #[tokio::test]
    async fn test_relogin_once_on_forbidden() {
        let server = MockServer::start().await;
        mount_login(&server, 2).await;

        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/info"))
            .and(query_param("category", "title-updates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"hash": "AAAA", "name": "Game", "state": "uploading", "progress": 1.0,
                 "size": 10, "added_on": 1703980800, "save_path": "/dl",
                 "content_path": "/dl/Game", "category": "title-updates", "tags": ""}
            ])))
            .mount(&server)
            .await;

        let qb = client(&server.uri());
        let torrents = qb
            .list_torrents(&TorrentFilters::category("title-updates"))
            .await
            .unwrap();
        assert_eq!(torrents.len(), 1);
        assert_eq!(torrents[0].hash, "aaaa");
        assert_eq!(torrents[0].payload_path().as_deref(), Some("/dl/Game"));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let qb = client(&server.uri());
        let err = qb.test_connection().await.unwrap_err();
        assert!(matches!(err, TorrentClientError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_files_and_priorities() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/api/v2/torrents/files"))
            .and(query_param("hash", "abcd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "Pack/Game [v0].nsp", "priority": 1},
                {"name": "Pack/Game [v65536].nsp", "priority": 0}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/filePrio"))
            .and(body_string_contains("id=0%7C1"))
            .and(body_string_contains("priority=0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let qb = client(&server.uri());
        let files = qb.torrent_files("ABCD").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].id, 1);
        assert!(!files[1].is_wanted());

        qb.set_file_priorities("abcd", &[0, 1], false).await.unwrap();
        qb.set_file_priorities("abcd", &[], true).await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_falls_back_to_start() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/resume"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/start"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let qb = client(&server.uri());
        qb.resume_torrent("abcd").await.unwrap();
    }

    #[tokio::test]
    async fn test_add_rejected() {
        let server = MockServer::start().await;
        mount_login(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fails."))
            .mount(&server)
            .await;

        let qb = client(&server.uri());
        let err = qb
            .add_torrent(AddTorrentRequest::url("http://indexer/dl/1").with_paused(true))
            .await
            .unwrap_err();
        assert!(matches!(err, TorrentClientError::InvalidTorrent(_)));
    }
}
