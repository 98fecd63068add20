//! Acquisition coordinator.
//!
//! Turns "this title is missing an update" into a file in the library:
//! - **Discover**: ask the library which updates are missing
//! - **Acquire**: search the indexer, add the best result restricted to the
//!   wanted version, remember it as pending
//! - **Reconcile**: move completed torrents into the library and make the
//!   daemon forget them
//!
//! State lives in memory only. Pending entries lost on restart come back as
//! orphaned completions or are re-discovered as missing.

mod coordinator;
mod query;
mod scheduler;
mod types;

pub use coordinator::{dedupe_key, AcquisitionCoordinator, RunTrigger};
pub use query::build_query_variants;
pub use types::{
    AcquisitionError, AcquisitionSnapshot, OpResult, PendingDownload, QueueRequest,
    ReconcileSummary, UpdateOptions,
};
