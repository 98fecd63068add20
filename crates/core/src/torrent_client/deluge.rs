//! Deluge Web JSON-RPC client implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::DelugeConfig;
use crate::metainfo::is_magnet;

use super::types::sort_recent_first;
use super::{
    AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError, TorrentFileEntry,
    TorrentFilters, TorrentInfo, TorrentState,
};

/// Deluge error code for an expired or missing web session.
const NOT_AUTHENTICATED: i64 = 1;

const STATUS_KEYS: [&str; 7] = [
    "name",
    "progress",
    "state",
    "total_size",
    "save_path",
    "label",
    "time_added",
];

/// Deluge client implementation.
pub struct DelugeClient {
    client: Client,
    config: DelugeConfig,
    /// Set once logged in and connected to a daemon host.
    session: Arc<RwLock<Option<String>>>,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

impl DelugeClient {
    /// Create a new Deluge client.
    pub fn new(config: DelugeConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
            request_id: AtomicU64::new(1),
        }
    }

    fn json_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/json") {
            base.to_string()
        } else {
            format!("{}/json", base)
        }
    }

    /// One raw JSON-RPC round trip, without session handling.
    async fn send(&self, method: &str, params: &Value) -> Result<RpcResponse, TorrentClientError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({ "method": method, "params": params, "id": id });

        let response = self
            .client
            .post(self.json_url())
            .json(&payload)
            .send()
            .await
            .map_err(TorrentClientError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))
    }

    /// Log in and make sure the web UI is attached to a daemon.
    async fn login(&self) -> Result<(), TorrentClientError> {
        let response = self.send("auth.login", &json!([self.config.password])).await?;
        if response.result.as_bool() != Some(true) {
            return Err(TorrentClientError::AuthenticationFailed(
                "Invalid password".to_string(),
            ));
        }
        debug!("Deluge login successful");

        let connected = self.send("web.connected", &json!([])).await?;
        if connected.result.as_bool() != Some(true) {
            let hosts = self.send("web.get_hosts", &json!([])).await?;
            let host_id = hosts
                .result
                .as_array()
                .and_then(|h| h.first())
                .and_then(|h| h.get(0))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    TorrentClientError::ConnectionFailed(
                        "Deluge web UI has no daemon hosts configured".to_string(),
                    )
                })?
                .to_string();
            debug!(host_id = %host_id, "Connecting Deluge web UI to daemon");
            self.send("web.connect", &json!([host_id])).await?;
        }

        let mut session = self.session.write().await;
        *session = Some("authenticated".to_string());
        Ok(())
    }

    async fn ensure_authenticated(&self) -> Result<(), TorrentClientError> {
        let session = self.session.read().await;
        if session.is_some() {
            return Ok(());
        }
        drop(session);
        self.login().await
    }

    /// Authenticated call; logs in again once on "not authenticated".
    async fn call(&self, method: &str, params: Value) -> Result<Value, TorrentClientError> {
        self.ensure_authenticated().await?;

        let mut response = self.send(method, &params).await?;
        if matches!(&response.error, Some(e) if e.code == NOT_AUTHENTICATED) {
            warn!("Deluge session expired, re-authenticating");
            {
                let mut session = self.session.write().await;
                *session = None;
            }
            self.login().await?;
            response = self.send(method, &params).await?;
        }

        match response.error {
            Some(e) if e.code == NOT_AUTHENTICATED => {
                Err(TorrentClientError::AuthenticationFailed(e.message))
            }
            Some(e) => Err(TorrentClientError::ApiError(e.message)),
            None => Ok(response.result),
        }
    }

    async fn file_state(&self, hash: &str) -> Result<(Vec<Value>, Vec<i64>), TorrentClientError> {
        let status = self
            .call(
                "core.get_torrent_status",
                json!([hash.to_lowercase(), ["files", "file_priorities"]]),
            )
            .await?;

        if status.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Err(TorrentClientError::TorrentNotFound(hash.to_string()));
        }

        let files = status
            .get("files")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let priorities = status
            .get("file_priorities")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(|p| p.as_i64().unwrap_or(1)).collect())
            .unwrap_or_default();
        Ok((files, priorities))
    }
}

/// Deluge state string to TorrentState.
fn parse_deluge_state(state: &str) -> TorrentState {
    match state {
        "Downloading" | "Allocating" => TorrentState::Downloading,
        "Seeding" => TorrentState::Seeding,
        "Paused" => TorrentState::Paused,
        "Checking" | "Moving" => TorrentState::Checking,
        "Queued" => TorrentState::Queued,
        "Error" => TorrentState::Error,
        _ => TorrentState::Unknown,
    }
}

fn status_to_info(hash: &str, status: &Map<String, Value>) -> TorrentInfo {
    let text = |key: &str| {
        status
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let name = text("name").unwrap_or_default();
    let save_path = text("save_path");

    TorrentInfo {
        hash: hash.to_lowercase(),
        state: parse_deluge_state(&text("state").unwrap_or_default()),
        // Deluge reports percent.
        progress: status.get("progress").and_then(Value::as_f64).unwrap_or(0.0) / 100.0,
        size_bytes: status
            .get("total_size")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        content_path: save_path
            .as_ref()
            .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), name)),
        save_path,
        category: text("label"),
        tags: Vec::new(),
        added_at: status
            .get("time_added")
            .and_then(Value::as_f64)
            .filter(|t| *t > 0.0)
            .and_then(|t| Utc.timestamp_opt(t as i64, 0).single()),
        name,
    }
}

#[async_trait]
impl TorrentClient for DelugeClient {
    fn name(&self) -> &str {
        "deluge"
    }

    async fn test_connection(&self) -> Result<String, TorrentClientError> {
        let info = self.call("daemon.info", json!([])).await?;
        Ok(info.as_str().unwrap_or("unknown").to_string())
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let mut options = json!({ "add_paused": request.paused });
        if let Some(path) = &request.download_path {
            options["download_location"] = json!(path);
        }

        let method = if is_magnet(&request.url) {
            "core.add_torrent_magnet"
        } else {
            "core.add_torrent_url"
        };
        let result = self.call(method, json!([request.url, options])).await?;
        let hash = result.as_str().map(str::to_lowercase);

        // Labels need the label plugin; a missing plugin must not fail the add.
        if let (Some(hash), Some(category)) = (&hash, &request.category) {
            // Fails when the label already exists.
            if let Err(e) = self.call("label.add", json!([category])).await {
                debug!(label = %category, error = %e, "Deluge label.add failed");
            }
            if let Err(e) = self.call("label.set_torrent", json!([hash, category])).await {
                warn!(hash = %hash, error = %e, "Failed to set Deluge label");
            }
        }

        Ok(AddTorrentResult { hash })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let mut filter = Map::new();
        if let Some(category) = &filters.category {
            filter.insert("label".to_string(), json!(category));
        }

        let result = self
            .call("core.get_torrents_status", json!([filter, STATUS_KEYS]))
            .await?;

        let mut torrents: Vec<TorrentInfo> = result
            .as_object()
            .map(|all| {
                all.iter()
                    .filter_map(|(hash, status)| {
                        status.as_object().map(|s| status_to_info(hash, s))
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Deluge has no tags; a tag filter never matches.
        torrents.retain(|t| filters.matches(t));
        sort_recent_first(&mut torrents);
        Ok(torrents)
    }

    async fn torrent_files(&self, hash: &str) -> Result<Vec<TorrentFileEntry>, TorrentClientError> {
        let (files, priorities) = self.file_state(hash).await?;

        Ok(files
            .iter()
            .enumerate()
            .map(|(pos, file)| {
                let id = file
                    .get("index")
                    .and_then(Value::as_u64)
                    .map(|i| i as usize)
                    .unwrap_or(pos);
                TorrentFileEntry {
                    id,
                    name: file
                        .get("path")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    priority: priorities.get(id).copied().unwrap_or(1),
                }
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

        // Deluge only accepts the full priority array.
        let (files, mut priorities) = self.file_state(hash).await?;
        priorities.resize(files.len().max(priorities.len()), 1);
        for id in file_ids {
            if let Some(p) = priorities.get_mut(*id) {
                *p = if wanted { 1 } else { 0 };
            }
        }

        self.call(
            "core.set_torrent_options",
            json!([[hash.to_lowercase()], { "file_priorities": priorities }]),
        )
        .await?;
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.call("core.resume_torrent", json!([[hash.to_lowercase()]]))
            .await?;
        Ok(())
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        self.call(
            "core.remove_torrent",
            json!([hash.to_lowercase(), delete_files]),
        )
        .await?;
        Ok(())
    }

    async fn remove_tag(&self, _hash: &str, _tag: &str) -> Result<(), TorrentClientError> {
        Ok(())
    }
}
