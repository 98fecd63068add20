//! Torrent daemon abstraction.
//!
//! This module provides a `TorrentClient` trait over the control APIs of
//! external download daemons (qBittorrent, Transmission, Deluge), and the
//! `Downloader` that runs acquisition operations on top of any of them.

mod deluge;
mod downloader;
mod qbittorrent;
mod transmission;
mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, TorrentClientBackend, TorrentClientConfig};

pub use deluge::DelugeClient;
pub use downloader::{AddOutcome, AddRequest, CompletedTorrent, Downloader, DownloaderSettings};
pub use qbittorrent::QBittorrentClient;
pub use transmission::TransmissionClient;
pub use types::*;

/// Build the client for the configured backend.
pub fn create_torrent_client(
    config: &TorrentClientConfig,
) -> Result<Arc<dyn TorrentClient>, ConfigError> {
    let timeout = Duration::from_secs(config.timeout_secs as u64);
    let missing = |backend: TorrentClientBackend| {
        ConfigError::ValidationError(format!(
            "torrent_client.backend is '{}' but [torrent_client.{}] is missing",
            backend.as_str(),
            backend.as_str()
        ))
    };

    let client: Arc<dyn TorrentClient> = match config.backend {
        TorrentClientBackend::QBittorrent => {
            let qb = config
                .qbittorrent
                .clone()
                .ok_or_else(|| missing(config.backend))?;
            Arc::new(QBittorrentClient::new(qb, timeout))
        }
        TorrentClientBackend::Transmission => {
            let tr = config
                .transmission
                .clone()
                .ok_or_else(|| missing(config.backend))?;
            Arc::new(TransmissionClient::new(tr, timeout))
        }
        TorrentClientBackend::Deluge => {
            let deluge = config
                .deluge
                .clone()
                .ok_or_else(|| missing(config.backend))?;
            Arc::new(DelugeClient::new(deluge, timeout))
        }
    };

    Ok(client)
}

/// Build a `Downloader` for the configured backend.
pub fn create_downloader(config: &TorrentClientConfig) -> Result<Downloader, ConfigError> {
    let client = create_torrent_client(config)?;
    Ok(Downloader::new(client, DownloaderSettings::from(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelugeConfig, QBittorrentConfig};

    #[test]
    fn test_create_selects_backend() {
        let mut config = TorrentClientConfig::new(TorrentClientBackend::Deluge);
        config.deluge = Some(DelugeConfig {
            url: "http://localhost:8112".to_string(),
            password: "deluge".to_string(),
        });
        assert_eq!(create_torrent_client(&config).unwrap().name(), "deluge");

        let mut config = TorrentClientConfig::new(TorrentClientBackend::QBittorrent);
        config.qbittorrent = Some(QBittorrentConfig {
            url: "http://localhost:8080".to_string(),
            username: "admin".to_string(),
            password: "x".to_string(),
        });
        assert_eq!(create_downloader(&config).unwrap().backend(), "qbittorrent");
    }

    #[test]
    fn test_create_without_backend_table() {
        let config = TorrentClientConfig::new(TorrentClientBackend::Transmission);
        let err = create_torrent_client(&config).err().unwrap();
        assert!(err.to_string().contains("[torrent_client.transmission]"));
    }
}
