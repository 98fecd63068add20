pub mod acquisition;
pub mod config;
pub mod library;
pub mod metainfo;
pub mod metrics;
pub mod searcher;
pub mod selection;
pub mod testing;
pub mod torrent_client;

pub use acquisition::{
    AcquisitionCoordinator, AcquisitionError, AcquisitionSnapshot, OpResult, PendingDownload,
    QueueRequest, UpdateOptions,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use library::{FsLibrary, Library, LibraryError, MissingUpdate, MoveOutcome};
pub use searcher::{ProwlarrSearcher, SearchError, SearchResult, Searcher};
pub use torrent_client::{
    create_downloader, create_torrent_client, Downloader, TorrentClient, TorrentClientError,
};
