//! File system library implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use crate::config::LibraryConfig;

use super::{Library, LibraryError, MissingUpdate, MoveOutcome};

const BUFFER_SIZE: usize = 64 * 1024;

/// Library backed by plain directories.
///
/// Missing updates come from a JSON manifest maintained by the external
/// identification pipeline.
pub struct FsLibrary {
    config: LibraryConfig,
    http: Client,
}

impl FsLibrary {
    pub fn new(config: LibraryConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http }
    }

    /// Attempts to move atomically (rename).
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // Cross-filesystem moves fail with EXDEV (18 on Linux)
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Copy a file, returning the SHA-256 of what was read.
    async fn copy_file(source: &Path, destination: &Path) -> Result<String, std::io::Error> {
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(source).await?);
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, File::create(destination).await?);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
            writer.write_all(&buffer[..bytes_read]).await?;
        }
        writer.flush().await?;

        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
        let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(path).await?);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Copy a file or directory tree and verify every file.
    async fn copy_verified(source: &Path, destination: &Path) -> Result<(), LibraryError> {
        let move_failed = |e: std::io::Error| LibraryError::MoveFailed {
            from: source.to_path_buf(),
            to: destination.to_path_buf(),
            error: e,
        };

        let mut stack = vec![(source.to_path_buf(), destination.to_path_buf())];
        while let Some((from, to)) = stack.pop() {
            let metadata = fs::metadata(&from).await.map_err(move_failed)?;
            if metadata.is_dir() {
                fs::create_dir_all(&to).await.map_err(move_failed)?;
                let mut entries = fs::read_dir(&from).await.map_err(move_failed)?;
                while let Some(entry) = entries.next_entry().await.map_err(move_failed)? {
                    stack.push((entry.path(), to.join(entry.file_name())));
                }
            } else {
                let expected = Self::copy_file(&from, &to).await.map_err(move_failed)?;
                let actual = Self::hash_file(&to).await.map_err(move_failed)?;
                if expected != actual {
                    return Err(LibraryError::ChecksumMismatch { path: to });
                }
            }
        }
        Ok(())
    }

    async fn remove_source(source: &Path) -> Result<(), std::io::Error> {
        if fs::metadata(source).await?.is_dir() {
            fs::remove_dir_all(source).await
        } else {
            fs::remove_file(source).await
        }
    }
}

#[async_trait]
impl Library for FsLibrary {
    async fn get_missing_updates(&self) -> Result<Vec<MissingUpdate>, LibraryError> {
        let Some(path) = &self.config.missing_updates_path else {
            return Ok(Vec::new());
        };

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No missing-updates manifest yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(LibraryError::Manifest {
                    path: path.clone(),
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| LibraryError::Manifest {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    fn library_roots(&self) -> Vec<PathBuf> {
        self.config.roots.clone()
    }

    async fn move_into_library(&self, source: &Path) -> Result<MoveOutcome, LibraryError> {
        let root = self.config.roots.first().ok_or(LibraryError::NoRoot)?;

        if fs::metadata(source).await.is_err() {
            return Ok(MoveOutcome::SourceMissing);
        }
        let Some(file_name) = source.file_name() else {
            return Ok(MoveOutcome::SourceMissing);
        };
        let destination = root.join(file_name);

        if fs::metadata(&destination).await.is_ok() {
            debug!(destination = %destination.display(), "Already in library, skipping move");
            return Ok(MoveOutcome::AlreadyPresent(destination));
        }

        let move_failed = |e: std::io::Error| LibraryError::MoveFailed {
            from: source.to_path_buf(),
            to: destination.clone(),
            error: e,
        };

        fs::create_dir_all(root).await.map_err(move_failed)?;

        if Self::try_atomic_move(source, &destination)
            .await
            .map_err(move_failed)?
        {
            info!(from = %source.display(), to = %destination.display(), "Moved into library");
            return Ok(MoveOutcome::Moved(destination));
        }

        // Cross-device: copy, verify, then delete the source.
        if let Err(e) = Self::copy_verified(source, &destination).await {
            if let Err(cleanup) = Self::remove_source(&destination).await {
                warn!(path = %destination.display(), error = %cleanup, "Failed to clean up partial copy");
            }
            return Err(e);
        }
        if let Err(e) = Self::remove_source(source).await {
            warn!(path = %source.display(), error = %e, "Copied into library but failed to remove source");
        }

        info!(from = %source.display(), to = %destination.display(), "Copied into library");
        Ok(MoveOutcome::Moved(destination))
    }

    async fn notify_library_changed(&self) -> Result<(), LibraryError> {
        let Some(url) = &self.config.rescan_url else {
            debug!("No rescan URL configured; skipping library notification");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| LibraryError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LibraryError::Notify(format!("HTTP {}", response.status())));
        }
        Ok(())
    }
}
