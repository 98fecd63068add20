//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of all external service traits,
//! allowing comprehensive E2E testing without a real indexer, daemon or
//! library.
//!
//! # Example
//!
//! ```rust,ignore
//! use acquirer_core::testing::{fixtures, MockLibrary, MockSearcher, MockTorrentClient};
//!
//! let client = MockTorrentClient::reporting_hash();
//! let searcher = MockSearcher::new();
//! let library = MockLibrary::new();
//!
//! searcher.set_results(vec![fixtures::search_result("Game Update", 20)]).await;
//! library.set_missing(vec![fixtures::missing_update("0100ABCD00010000", "Game", 65536)]).await;
//! ```

mod mock_library;
mod mock_searcher;
mod mock_torrent_client;

pub use mock_library::MockLibrary;
pub use mock_searcher::{MockSearcher, RecordedSearch};
pub use mock_torrent_client::{MockTorrentClient, MockTorrentSpec, RecordedRemoval};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::library::MissingUpdate;
    use crate::searcher::SearchResult;

    /// Create a search result with reasonable defaults.
    pub fn search_result(title: &str, seeders: u32) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            size: 1024 * 1024 * 100, // 100 MB
            seeders,
            leechers: 1,
            download_url: format!(
                "http://indexer.test/download/{}",
                title.to_lowercase().replace(' ', "-")
            ),
            info_url: None,
            indexer_id: 1,
        }
    }

    /// Create a search result downloading from a specific URL.
    pub fn search_result_at(title: &str, seeders: u32, download_url: &str) -> SearchResult {
        SearchResult {
            download_url: download_url.to_string(),
            ..search_result(title, seeders)
        }
    }

    pub fn missing_update(title_id: &str, title_name: &str, version: u64) -> MissingUpdate {
        MissingUpdate {
            title_id: title_id.to_string(),
            title_name: title_name.to_string(),
            version,
        }
    }

    /// Bencoded multi-file torrent descriptor with the given file names.
    pub fn multi_file_torrent(name: &str, files: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"d8:announce14:http://tracker4:infod5:filesl");
        for file in files {
            out.extend_from_slice(b"d6:lengthi1024e4:pathl");
            push_bytes(&mut out, file.as_bytes());
            out.extend_from_slice(b"ee");
        }
        out.extend_from_slice(b"e4:name");
        push_bytes(&mut out, name.as_bytes());
        out.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
        out.extend_from_slice(&[0u8; 20]);
        out.extend_from_slice(b"ee");
        out
    }

    fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
        out.extend_from_slice(bytes.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(bytes);
    }

}
