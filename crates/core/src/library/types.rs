//! Types for the content library collaborator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A title that owns a base install but lacks its latest update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingUpdate {
    pub title_id: String,
    pub title_name: String,
    /// Highest version known to exist.
    pub version: u64,
}

/// Result of moving a payload into the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The payload now lives at this path.
    Moved(PathBuf),
    /// Something with the same name was already in the library; nothing moved.
    AlreadyPresent(PathBuf),
    /// The source no longer exists (already moved by an earlier pass).
    SourceMissing,
}

impl MoveOutcome {
    /// Destination path, when the payload is in the library.
    pub fn destination(&self) -> Option<&PathBuf> {
        match self {
            MoveOutcome::Moved(p) | MoveOutcome::AlreadyPresent(p) => Some(p),
            MoveOutcome::SourceMissing => None,
        }
    }
}

/// Errors that can occur in library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("No library root configured")]
    NoRoot,

    #[error("Failed to read missing-updates manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("Failed to move {from} to {to}")]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Copy of {path} did not verify")]
    ChecksumMismatch { path: PathBuf },

    #[error("Library rescan request failed: {0}")]
    Notify(String),
}

/// The content library as seen by the acquisition coordinator.
#[async_trait]
pub trait Library: Send + Sync {
    /// Titles whose highest owned update is behind the highest known one.
    async fn get_missing_updates(&self) -> Result<Vec<MissingUpdate>, LibraryError>;

    /// Configured library roots. Payloads go into the first one.
    fn library_roots(&self) -> Vec<PathBuf>;

    /// Move a completed payload (file or directory) into the library.
    async fn move_into_library(&self, source: &Path) -> Result<MoveOutcome, LibraryError>;

    /// Ask the library to pick up new files.
    async fn notify_library_changed(&self) -> Result<(), LibraryError>;
}
