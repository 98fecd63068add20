use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub indexer: Option<IndexerConfig>,
    #[serde(default)]
    pub torrent_client: Option<TorrentClientConfig>,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Indexer aggregator (Prowlarr API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Base URL (e.g., "http://localhost:9696")
    pub url: String,
    /// API key sent as `X-Api-Key`
    pub api_key: String,
    /// Request timeout in seconds (default: 15)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Restrict searches to these indexer ids (empty = all)
    #[serde(default)]
    pub indexer_ids: Vec<i64>,
}

fn default_timeout() -> u32 {
    15
}

/// Available torrent daemon families
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentClientBackend {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
    Transmission,
    Deluge,
}

impl TorrentClientBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentClientBackend::QBittorrent => "qbittorrent",
            TorrentClientBackend::Transmission => "transmission",
            TorrentClientBackend::Deluge => "deluge",
        }
    }
}

/// Torrent daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    pub backend: TorrentClientBackend,
    /// Category (qBittorrent) / label (Transmission, Deluge) for our torrents
    #[serde(default = "default_category")]
    pub category: String,
    /// Save path passed to the daemon when adding
    #[serde(default)]
    pub download_path: Option<String>,
    /// Request timeout in seconds (default: 15)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Attempts when resolving the id of a just-added torrent
    #[serde(default = "default_resolve_attempts")]
    pub resolve_attempts: u32,
    /// Sleep between resolution / file-list attempts (milliseconds)
    #[serde(default = "default_resolve_delay_ms")]
    pub resolve_delay_ms: u64,
    /// Attempts when waiting for the per-torrent file list
    #[serde(default = "default_file_list_attempts")]
    pub file_list_attempts: u32,
    /// Attempts when re-applying file priorities that did not stick
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
    #[serde(default)]
    pub transmission: Option<TransmissionConfig>,
    #[serde(default)]
    pub deluge: Option<DelugeConfig>,
}

fn default_category() -> String {
    "title-updates".to_string()
}

fn default_resolve_attempts() -> u32 {
    10
}

fn default_resolve_delay_ms() -> u64 {
    500
}

fn default_file_list_attempts() -> u32 {
    10
}

fn default_verify_attempts() -> u32 {
    3
}

impl TorrentClientConfig {
    /// Config with defaults for the given backend and no backend table.
    pub fn new(backend: TorrentClientBackend) -> Self {
        Self {
            backend,
            category: default_category(),
            download_path: None,
            timeout_secs: default_timeout(),
            resolve_attempts: default_resolve_attempts(),
            resolve_delay_ms: default_resolve_delay_ms(),
            file_list_attempts: default_file_list_attempts(),
            verify_attempts: default_verify_attempts(),
            qbittorrent: None,
            transmission: None,
            deluge: None,
        }
    }
}

/// qBittorrent Web API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Transmission RPC configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransmissionConfig {
    /// Base URL (e.g., "http://localhost:9091"); "/transmission/rpc" is appended
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Deluge Web JSON-RPC configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DelugeConfig {
    /// Web UI URL (e.g., "http://localhost:8112"); "/json" is appended
    pub url: String,
    pub password: String,
}

/// Acquisition job configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    /// Run the periodic job. Manual operations work either way.
    #[serde(default)]
    pub enabled: bool,
    /// Scheduler tick interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Automatic runs closer than this to the previous run are skipped
    #[serde(default = "default_min_run_interval_secs")]
    pub min_run_interval_secs: u64,
    #[serde(default = "default_min_seeders")]
    pub min_seeders: u32,
    #[serde(default)]
    pub required_terms: Vec<String>,
    #[serde(default)]
    pub blacklist_terms: Vec<String>,
    #[serde(default)]
    pub query_prefix: Option<String>,
    #[serde(default)]
    pub query_suffix: Option<String>,
    /// Skip files carrying a Russian locale marker
    #[serde(default)]
    pub exclude_russian: bool,
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_min_run_interval_secs() -> u64 {
    300
}

fn default_min_seeders() -> u32 {
    1
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            min_run_interval_secs: default_min_run_interval_secs(),
            min_seeders: default_min_seeders(),
            required_terms: Vec::new(),
            blacklist_terms: Vec::new(),
            query_prefix: None,
            query_suffix: None,
            exclude_russian: false,
        }
    }
}

/// Content library configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Library root directories; completed payloads land in the first one
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// JSON manifest of titles missing their latest update
    #[serde(default)]
    pub missing_updates_path: Option<PathBuf>,
    /// Endpoint POSTed to after new files were moved in
    #[serde(default)]
    pub rescan_url: Option<String>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer: Option<SanitizedIndexerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_client: Option<SanitizedTorrentClientConfig>,
    pub acquisition: AcquisitionConfig,
    pub library: LibraryConfig,
}

/// Sanitized indexer config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIndexerConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
    pub indexer_ids: Vec<i64>,
}

/// Sanitized torrent client config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTorrentClientConfig {
    pub backend: String,
    pub url: Option<String>,
    pub category: String,
    pub download_path: Option<String>,
    pub credentials_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            indexer: config.indexer.as_ref().map(|i| SanitizedIndexerConfig {
                url: i.url.clone(),
                api_key_configured: !i.api_key.is_empty(),
                timeout_secs: i.timeout_secs,
                indexer_ids: i.indexer_ids.clone(),
            }),
            torrent_client: config.torrent_client.as_ref().map(|tc| {
                let (url, credentials_configured) = match tc.backend {
                    TorrentClientBackend::QBittorrent => tc
                        .qbittorrent
                        .as_ref()
                        .map(|q| (Some(q.url.clone()), !q.password.is_empty()))
                        .unwrap_or((None, false)),
                    TorrentClientBackend::Transmission => tc
                        .transmission
                        .as_ref()
                        .map(|t| (Some(t.url.clone()), t.password.is_some()))
                        .unwrap_or((None, false)),
                    TorrentClientBackend::Deluge => tc
                        .deluge
                        .as_ref()
                        .map(|d| (Some(d.url.clone()), !d.password.is_empty()))
                        .unwrap_or((None, false)),
                };
                SanitizedTorrentClientConfig {
                    backend: tc.backend.as_str().to_string(),
                    url,
                    category: tc.category.clone(),
                    download_path: tc.download_path.clone(),
                    credentials_configured,
                }
            }),
            acquisition: config.acquisition.clone(),
            library: config.library.clone(),
        }
    }
}
