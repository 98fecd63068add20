//! HTTP surface of the acquirer: router, handlers, shared state and
//! Prometheus metrics.

pub mod api;
pub mod metrics;
pub mod state;
