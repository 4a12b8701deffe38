//! Run Aggregation
//!
//! Reduces N independent measurement runs to a single aggregate by taking
//! the median of each metric separately, and gates the result on a minimum
//! total sample size.

use thiserror::Error;
use wirebench_core::MetricsSnapshot;

/// Result of one measurement run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// 1-based run index.
    pub run: usize,
    /// Processed packets per second over the measurement window.
    pub pps: f64,
    /// Processed megabytes per second over the measurement window.
    pub mbps: f64,
    /// p95 latency in nanoseconds.
    pub p95_ns: u64,
    /// Packets processed in the measurement window.
    pub processed: u64,
    /// Packets captured in the measurement window.
    pub captured: u64,
    /// Dropped fraction of captured packets.
    pub drop_rate: f64,
    /// Measurement-window length in seconds.
    pub elapsed_sec: f64,
}

impl RunResult {
    /// Derive a run result from an end-of-run snapshot.
    pub fn from_snapshot(run: usize, snapshot: &MetricsSnapshot) -> Self {
        Self {
            run,
            pps: snapshot.pps(),
            mbps: snapshot.mbps(),
            p95_ns: snapshot.percentile_ns(0.95),
            processed: snapshot.pkts_processed,
            captured: snapshot.pkts_captured,
            drop_rate: snapshot.drop_rate(),
            elapsed_sec: snapshot.capture_elapsed_sec,
        }
    }
}

/// Median aggregate across runs.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Median packets per second.
    pub pps: f64,
    /// Median megabytes per second.
    pub mbps: f64,
    /// Median p95 latency in nanoseconds.
    pub p95_ns: f64,
    /// Median drop rate.
    pub drop_rate: f64,
    /// Total packets processed across all runs.
    pub total_processed: u64,
    /// Number of runs aggregated.
    pub runs: usize,
}

/// Fewer packets were processed than the gate requires.
#[derive(Debug, Clone, Error)]
#[error("insufficient sample: {processed} packets processed across {runs} run(s), {required} required")]
pub struct InsufficientSample {
    /// Total packets processed.
    pub processed: u64,
    /// Configured minimum.
    pub required: u64,
    /// Number of runs measured.
    pub runs: usize,
}

/// Median of a sample set: central value for odd lengths, mean of the two
/// central values for even lengths, 0 for an empty set.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Aggregate run results, enforcing the minimum-sample gate.
pub fn aggregate(results: &[RunResult], min_packets: u64) -> Result<Aggregate, InsufficientSample> {
    let total_processed: u64 = results.iter().map(|r| r.processed).sum();
    if total_processed < min_packets {
        return Err(InsufficientSample {
            processed: total_processed,
            required: min_packets,
            runs: results.len(),
        });
    }

    let pps: Vec<f64> = results.iter().map(|r| r.pps).collect();
    let mbps: Vec<f64> = results.iter().map(|r| r.mbps).collect();
    let p95: Vec<f64> = results.iter().map(|r| r.p95_ns as f64).collect();
    let drops: Vec<f64> = results.iter().map(|r| r.drop_rate).collect();

    Ok(Aggregate {
        pps: median(&pps),
        mbps: median(&mbps),
        p95_ns: median(&p95),
        drop_rate: median(&drops),
        total_processed,
        runs: results.len(),
    })
}
