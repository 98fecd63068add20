//! Transmission RPC client implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::TransmissionConfig;

use super::types::sort_recent_first;
use super::{
    AddTorrentRequest, AddTorrentResult, TorrentClient, TorrentClientError, TorrentFileEntry,
    TorrentFilters, TorrentInfo, TorrentState,
};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Session-id negotiation attempts per call.
const MAX_HANDSHAKES: usize = 3;

const LIST_FIELDS: [&str; 8] = [
    "hashString",
    "name",
    "percentDone",
    "status",
    "totalSize",
    "downloadDir",
    "labels",
    "addedDate",
];

/// Transmission client implementation.
pub struct TransmissionClient {
    client: Client,
    config: TransmissionConfig,
    /// Last CSRF session id handed out by the daemon.
    session_id: Arc<RwLock<Option<String>>>,
}

impl TransmissionClient {
    /// Create a new Transmission client.
    pub fn new(config: TransmissionConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            session_id: Arc::new(RwLock::new(None)),
        }
    }

    fn rpc_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/transmission/rpc") {
            base.to_string()
        } else {
            format!("{}/transmission/rpc", base)
        }
    }

    /// Call an RPC method, negotiating the session id on HTTP 409.
    async fn rpc(&self, method: &str, arguments: Value) -> Result<Value, TorrentClientError> {
        let url = self.rpc_url();
        let payload = json!({ "method": method, "arguments": arguments });

        for _ in 0..MAX_HANDSHAKES {
            let mut request = self.client.post(&url).json(&payload);
            if let Some(id) = self.session_id.read().await.as_deref() {
                request = request.header(SESSION_HEADER, id);
            }
            if let Some(user) = self.config.username.as_deref().filter(|u| !u.is_empty()) {
                request = request.basic_auth(user, self.config.password.as_deref());
            }

            let response = request
                .send()
                .await
                .map_err(TorrentClientError::from_reqwest)?;

            match response.status() {
                StatusCode::CONFLICT => {
                    let id = response
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    debug!("Transmission session id refreshed");
                    *self.session_id.write().await = id;
                    continue;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(TorrentClientError::AuthenticationFailed(
                        "Invalid credentials".to_string(),
                    ));
                }
                status if !status.is_success() => {
                    return Err(TorrentClientError::ApiError(format!("HTTP {}", status)));
                }
                _ => {}
            }

            let body: RpcResponse = response
                .json()
                .await
                .map_err(|e| TorrentClientError::ApiError(format!("Failed to parse response: {}", e)))?;

            if body.result != "success" {
                return Err(TorrentClientError::ApiError(body.result));
            }
            return Ok(body.arguments);
        }

        Err(TorrentClientError::ConnectionFailed(
            "Failed negotiating Transmission session id".to_string(),
        ))
    }

    async fn get_torrents(
        &self,
        ids: Option<&str>,
        fields: &[&str],
    ) -> Result<Vec<Value>, TorrentClientError> {
        let mut arguments = json!({ "fields": fields });
        if let Some(hash) = ids {
            arguments["ids"] = json!([hash.to_lowercase()]);
        }
        let result = self.rpc("torrent-get", arguments).await?;
        Ok(result
            .get("torrents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_single(&self, hash: &str, fields: &[&str]) -> Result<Value, TorrentClientError> {
        self.get_torrents(Some(hash), fields)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TorrentClientError::TorrentNotFound(hash.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrTorrent {
    hash_string: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    percent_done: f64,
    #[serde(default)]
    status: i64,
    #[serde(default)]
    total_size: i64,
    #[serde(default)]
    download_dir: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    added_date: i64,
}

impl TrTorrent {
    fn into_torrent_info(self) -> TorrentInfo {
        let content_path = if self.download_dir.is_empty() {
            None
        } else {
            Some(format!(
                "{}/{}",
                self.download_dir.trim_end_matches('/'),
                self.name
            ))
        };

        TorrentInfo {
            hash: self.hash_string.to_lowercase(),
            state: parse_tr_status(self.status),
            progress: self.percent_done,
            size_bytes: self.total_size.max(0) as u64,
            save_path: if self.download_dir.is_empty() {
                None
            } else {
                Some(self.download_dir)
            },
            content_path,
            // Our category is always the first label.
            category: self.labels.first().cloned(),
            tags: self.labels,
            added_at: if self.added_date > 0 {
                Utc.timestamp_opt(self.added_date, 0).single()
            } else {
                None
            },
            name: self.name,
        }
    }
}

/// Transmission numeric status to TorrentState.
fn parse_tr_status(status: i64) -> TorrentState {
    match status {
        0 => TorrentState::Paused,
        1 | 3 | 5 => TorrentState::Queued,
        2 => TorrentState::Checking,
        4 => TorrentState::Downloading,
        6 => TorrentState::Seeding,
        _ => TorrentState::Unknown,
    }
}

#[async_trait]
impl TorrentClient for TransmissionClient {
    fn name(&self) -> &str {
        "transmission"
    }

    async fn test_connection(&self) -> Result<String, TorrentClientError> {
        let session = self.rpc("session-get", json!({ "fields": ["version"] })).await?;
        Ok(session
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let mut arguments = json!({
            "filename": request.url,
            "paused": request.paused,
        });
        if let Some(path) = &request.download_path {
            arguments["download-dir"] = json!(path);
        }
        let labels: Vec<&String> = request.category.iter().chain(request.tag.iter()).collect();
        if !labels.is_empty() {
            arguments["labels"] = json!(labels);
        }

        let result = self.rpc("torrent-add", arguments).await?;
        let hash = result
            .get("torrent-added")
            .or_else(|| result.get("torrent-duplicate"))
            .and_then(|t| t.get("hashString"))
            .and_then(Value::as_str)
            .map(str::to_lowercase);

        Ok(AddTorrentResult { hash })
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let raw = self.get_torrents(None, &LIST_FIELDS).await?;
        let mut results: Vec<TorrentInfo> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value::<TrTorrent>(v).ok())
            .map(TrTorrent::into_torrent_info)
            .filter(|t| filters.matches(t))
            .collect();
        sort_recent_first(&mut results);
        Ok(results)
    }

    async fn torrent_files(&self, hash: &str) -> Result<Vec<TorrentFileEntry>, TorrentClientError> {
        let torrent = self.get_single(hash, &["files", "fileStats"]).await?;
        let empty = Vec::new();
        let files = torrent.get("files").and_then(Value::as_array).unwrap_or(&empty);
        let stats = torrent
            .get("fileStats")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        Ok(files
            .iter()
            .enumerate()
            .map(|(idx, file)| {
                let wanted = stats
                    .get(idx)
                    .and_then(|s| s.get("wanted"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                TorrentFileEntry {
                    id: idx,
                    name: file
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    priority: if wanted { 1 } else { 0 },
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
        let key = if wanted { "files-wanted" } else { "files-unwanted" };
        let mut arguments = json!({ "ids": [hash.to_lowercase()] });
        arguments[key] = json!(file_ids);
        self.rpc("torrent-set", arguments).await?;
        Ok(())
    }

    async fn resume_torrent(&self, hash: &str) -> Result<(), TorrentClientError> {
        self.rpc("torrent-start", json!({ "ids": [hash.to_lowercase()] }))
            .await?;
        Ok(())
    }

    async fn remove_torrent(&self, hash: &str, delete_files: bool) -> Result<(), TorrentClientError> {
        self.rpc(
            "torrent-remove",
            json!({ "ids": [hash.to_lowercase()], "delete-local-data": delete_files }),
        )
        .await?;
        Ok(())
    }

    async fn remove_tag(&self, hash: &str, tag: &str) -> Result<(), TorrentClientError> {
        let torrent = self.get_single(hash, &["labels"]).await?;
        let labels: Vec<String> = torrent
            .get("labels")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .filter(|l| *l != tag)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        self.rpc(
            "torrent-set",
            json!({ "ids": [hash.to_lowercase()], "labels": labels }),
        )
        .await?;
        Ok(())
    }
}
