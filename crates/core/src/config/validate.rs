use super::{types::Config, ConfigError, TorrentClientBackend};

/// Validate configuration.
///
/// Checks the pieces serde cannot: the selected torrent backend has its
/// table, URLs are non-empty and retry budgets are usable.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if let Some(indexer) = &config.indexer {
        if indexer.url.trim().is_empty() {
            return Err(invalid("indexer.url cannot be empty"));
        }
    }

    if let Some(tc) = &config.torrent_client {
        let url = match tc.backend {
            TorrentClientBackend::QBittorrent => tc.qbittorrent.as_ref().map(|c| &c.url),
            TorrentClientBackend::Transmission => tc.transmission.as_ref().map(|c| &c.url),
            TorrentClientBackend::Deluge => tc.deluge.as_ref().map(|c| &c.url),
        };
        match url {
            None => {
                return Err(ConfigError::ValidationError(format!(
                    "torrent_client.backend = \"{0}\" requires a [torrent_client.{0}] section",
                    tc.backend.as_str()
                )))
            }
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::ValidationError(format!(
                    "torrent_client.{}.url cannot be empty",
                    tc.backend.as_str()
                )))
            }
            Some(_) => {}
        }
        if tc.resolve_attempts == 0 || tc.file_list_attempts == 0 {
            return Err(invalid(
                "torrent_client.resolve_attempts and file_list_attempts must be at least 1",
            ));
        }
    }

    if config.acquisition.enabled && config.acquisition.interval_secs == 0 {
        return Err(invalid("acquisition.interval_secs cannot be 0"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
