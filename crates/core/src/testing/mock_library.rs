//! Mock library for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::library::{Library, LibraryError, MissingUpdate, MoveOutcome};

/// Mock implementation of the Library trait.
///
/// Moves are simulated by file name: a payload whose name is already in the
/// library is reported as present, everything else "moves" into the root.
pub struct MockLibrary {
    root: PathBuf,
    missing: Arc<RwLock<Vec<MissingUpdate>>>,
    /// File names currently in the library.
    contents: Arc<RwLock<HashSet<String>>>,
    /// Sources already gone from the download directory.
    missing_sources: Arc<RwLock<HashSet<PathBuf>>>,
    moves: Arc<RwLock<Vec<PathBuf>>>,
    /// Remaining moves to fail.
    failing_moves: Arc<RwLock<usize>>,
    notifications: AtomicUsize,
}

impl Default for MockLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLibrary {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/mock/library"),
            missing: Arc::new(RwLock::new(Vec::new())),
            contents: Arc::new(RwLock::new(HashSet::new())),
            missing_sources: Arc::new(RwLock::new(HashSet::new())),
            moves: Arc::new(RwLock::new(Vec::new())),
            failing_moves: Arc::new(RwLock::new(0)),
            notifications: AtomicUsize::new(0),
        }
    }

    pub async fn set_missing(&self, missing: Vec<MissingUpdate>) {
        *self.missing.write().await = missing;
    }

    /// Pretend a file with this name is already in the library.
    pub async fn add_existing(&self, file_name: &str) {
        self.contents.write().await.insert(file_name.to_string());
    }

    /// Pretend a download source no longer exists.
    pub async fn mark_source_missing(&self, source: impl Into<PathBuf>) {
        self.missing_sources.write().await.insert(source.into());
    }

    /// Fail the next `count` moves.
    pub async fn fail_next_moves(&self, count: usize) {
        *self.failing_moves.write().await = count;
    }

    /// Sources of every move attempt, in order.
    pub async fn move_attempts(&self) -> Vec<PathBuf> {
        self.moves.read().await.clone()
    }

    pub async fn contains(&self, file_name: &str) -> bool {
        self.contents.read().await.contains(file_name)
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Library for MockLibrary {
    async fn get_missing_updates(&self) -> Result<Vec<MissingUpdate>, LibraryError> {
        Ok(self.missing.read().await.clone())
    }

    fn library_roots(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    async fn move_into_library(&self, source: &Path) -> Result<MoveOutcome, LibraryError> {
        self.moves.write().await.push(source.to_path_buf());

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let destination = self.root.join(&file_name);

        {
            let mut failing = self.failing_moves.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(LibraryError::MoveFailed {
                    from: source.to_path_buf(),
                    to: destination,
                    error: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock failure"),
                });
            }
        }

        if self.missing_sources.read().await.contains(source) {
            return Ok(MoveOutcome::SourceMissing);
        }

        let mut contents = self.contents.write().await;
        if !contents.insert(file_name) {
            return Ok(MoveOutcome::AlreadyPresent(destination));
        }
        // The source is gone once moved.
        self.missing_sources.write().await.insert(source.to_path_buf());
        Ok(MoveOutcome::Moved(destination))
    }

    async fn notify_library_changed(&self) -> Result<(), LibraryError> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
