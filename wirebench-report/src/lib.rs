#![warn(missing_docs)]
//! Wirebench Report - Persistence and Formatting
//!
//! The on-disk metrics schema, the baseline view over it, and the
//! human-readable summary lines:
//! - [`MetricsReport`]: schema-aware serde model with defaulted fields
//! - [`Baseline`]: the gated metrics reduced from a stored report
//! - [`human`]: one-line summaries and latency autoscaling

mod baseline;
pub mod human;
mod json;
mod report;

pub use baseline::{Baseline, BaselineError};
pub use json::generate_json_report;
pub use report::{
    ByteSection, ErrorSection, EthertypeSection, LatencySection, MetricsReport, PacketSection,
    ProtocolSection, QueueSection, RunMetadata,
};
