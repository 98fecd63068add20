//! Indexer search abstraction.
//!
//! This module provides a `Searcher` trait over an indexer aggregator,
//! the Prowlarr implementation, and ranking of the returned results.

mod prowlarr;
mod ranking;
mod types;

pub use prowlarr::ProwlarrSearcher;
pub use ranking::{normalize, pick_best_result, rank_results, score_result, RankCriteria};
pub use types::*;
