//! Baseline Loading
//!
//! A baseline is a previously exported metrics object reduced to the four
//! gated metrics plus its metadata block. Loading is schema-aware: missing
//! rate fields are recomputed from raw counters and elapsed time, and a
//! file is rejected only when it carries no usable throughput signal.

use std::path::Path;

use thiserror::Error;

use crate::report::{MetricsReport, RunMetadata};

/// Why a baseline could not be loaded.
#[derive(Debug, Error)]
pub enum BaselineError {
    /// The file could not be read.
    #[error("failed to read baseline file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid metrics JSON.
    #[error("failed to parse baseline JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The file parsed but carries no throughput signal.
    #[error("baseline file missing required metrics (no rate and no processed count)")]
    MissingMetrics,
}

/// The gated metrics of a stored baseline.
#[derive(Debug, Clone)]
pub struct Baseline {
    /// Processed packets per second.
    pub pps: f64,
    /// Processed megabytes per second.
    pub mbps: f64,
    /// p95 latency in nanoseconds.
    pub p95_ns: u64,
    /// Dropped fraction of captured frames.
    pub drop_rate: f64,
    /// Total processed packets.
    pub pkts_processed: u64,
    /// Metadata block, absent in files written by older builds.
    pub metadata: Option<RunMetadata>,
}

impl Baseline {
    /// Load and reduce a baseline file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BaselineError> {
        let json = std::fs::read_to_string(path)?;
        let report: MetricsReport = serde_json::from_str(&json)?;
        Self::from_report(&report)
    }

    /// Reduce a parsed report to its gated metrics.
    ///
    /// Valid iff the packet rate or the processed count is positive.
    pub fn from_report(report: &MetricsReport) -> Result<Self, BaselineError> {
        let elapsed = report.rate_elapsed_sec();

        let mut pps = report.packets.rate_pps;
        if pps <= 0.0 && elapsed > 0.0 {
            pps = report.packets.processed as f64 / elapsed;
        }

        let mut mbps = report.bytes.rate_mbps;
        if mbps <= 0.0 && elapsed > 0.0 && report.bytes.processed > 0 {
            mbps = report.bytes.processed as f64 / elapsed / (1024.0 * 1024.0);
        }

        // An explicit aggregate drop rate (written by --save-baseline) wins
        // over the single-snapshot derivation from raw counters.
        let drop_rate = match report.errors.drop_rate {
            Some(rate) => rate,
            None => {
                let total_drops = report.errors.queue_drops + report.errors.capture_drops;
                if report.packets.captured > 0 {
                    total_drops as f64 / report.packets.captured as f64
                } else {
                    0.0
                }
            }
        };

        if pps <= 0.0 && report.packets.processed == 0 {
            return Err(BaselineError::MissingMetrics);
        }

        Ok(Self {
            pps,
            mbps,
            p95_ns: report.latency_ns.p95,
            drop_rate,
            pkts_processed: report.packets.processed,
            metadata: report.metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn report_json(body: &str) -> MetricsReport {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_explicit_rates_used() {
        let report = report_json(
            r#"{
                "elapsed_sec": 10.0,
                "packets": {"captured": 1000, "processed": 950, "rate_pps": 95.0},
                "bytes": {"processed": 97280, "rate_mbps": 0.5},
                "latency_ns": {"p95": 200000}
            }"#,
        );
        let baseline = Baseline::from_report(&report).unwrap();
        assert_eq!(baseline.pps, 95.0);
        assert_eq!(baseline.mbps, 0.5);
        assert_eq!(baseline.p95_ns, 200_000);
    }

    #[test]
    fn test_missing_rates_recomputed() {
        let report = report_json(
            r#"{
                "elapsed_sec": 10.0,
                "capture_elapsed_sec": 8.0,
                "packets": {"captured": 800, "processed": 800},
                "bytes": {"processed": 8388608}
            }"#,
        );
        let baseline = Baseline::from_report(&report).unwrap();
        // Recomputed over the capture window.
        assert!((baseline.pps - 100.0).abs() < 1e-9);
        assert!((baseline.mbps - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_drop_rate_preferred() {
        let report = report_json(
            r#"{
                "packets": {"captured": 1000, "processed": 900, "rate_pps": 90.0},
                "errors": {"queue_drops": 60, "capture_drops": 40, "drop_rate": 0.02}
            }"#,
        );
        let baseline = Baseline::from_report(&report).unwrap();
        // The stored aggregate wins over the 0.1 the raw counters imply.
        assert!((baseline.drop_rate - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_drop_rate_derived_from_counters() {
        let report = report_json(
            r#"{
                "elapsed_sec": 10.0,
                "packets": {"captured": 1000, "processed": 900, "rate_pps": 90.0},
                "errors": {"queue_drops": 60, "capture_drops": 40}
            }"#,
        );
        let baseline = Baseline::from_report(&report).unwrap();
        assert!((baseline.drop_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_empty_baseline_rejected() {
        let report = report_json(r#"{"elapsed_sec": 10.0}"#);
        assert!(matches!(
            Baseline::from_report(&report),
            Err(BaselineError::MissingMetrics)
        ));
    }

    #[test]
    fn test_metadata_carried_through() {
        let report = report_json(
            r#"{
                "packets": {"processed": 10, "rate_pps": 1.0},
                "metadata": {"interface": "eth0", "filter": "icmp", "threads": 4}
            }"#,
        );
        let baseline = Baseline::from_report(&report).unwrap();
        let metadata = baseline.metadata.unwrap();
        assert_eq!(metadata.interface, "eth0");
        assert_eq!(metadata.filter, "icmp");
        assert_eq!(metadata.threads, 4);
        // Defaulted fields
        assert_eq!(metadata.traffic_mode, "");
        assert_eq!(metadata.traffic_rate, 0);
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"packets": {{"captured": 100, "processed": 100, "rate_pps": 10.0}}}}"#
        )
        .unwrap();

        let baseline = Baseline::load(file.path()).unwrap();
        assert_eq!(baseline.pps, 10.0);
        assert_eq!(baseline.pkts_processed, 100);
        assert!(baseline.metadata.is_none());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            Baseline::load("/nonexistent/baseline.json"),
            Err(BaselineError::Io(_))
        ));
    }

    #[test]
    fn test_load_garbage_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();
        assert!(matches!(
            Baseline::load(file.path()),
            Err(BaselineError::Parse(_))
        ));
    }
}
