#![warn(missing_docs)]
//! Wirebench Statistics - Aggregation and Regression Judgement
//!
//! Turns per-run snapshots into a CI verdict:
//! - Median aggregation across N runs with a minimum-sample gate
//! - Per-run baseline comparison with K-of-N persistence
//! - Metadata compatibility validation (must-match vs warn-only fields)

mod aggregate;
mod regression;

pub use aggregate::{aggregate, median, Aggregate, InsufficientSample, RunResult};
pub use regression::{
    compare_run, judge, persistence_threshold, validate_metadata, FieldCheck, FieldStatus,
    MetadataCheck, MetricDelta, MetricVerdict, Outcome, RegressionReport, RunComparison,
    DEFAULT_THRESHOLD, PERSISTENCE_FRACTION,
};
