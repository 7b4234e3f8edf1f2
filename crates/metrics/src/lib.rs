//! Metric names for ebb, recorded through the `metrics` crate facade.
//!
//! Crates record metrics behind their optional `metrics` feature:
//!
//! ```rust,ignore
//! use ebb_metrics::{counter, purge};
//!
//! counter!(purge::DELETES_TOTAL).increment(1);
//! ```
//!
//! Nothing is exported until the embedding binary installs a recorder. With
//! the `prometheus` feature, [`init_metrics`] installs one that serves the
//! Prometheus text format over HTTP.

mod definitions;
#[cfg(feature = "prometheus")]
mod recorder;

pub use definitions::*;
#[cfg(feature = "prometheus")]
pub use recorder::init_metrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
