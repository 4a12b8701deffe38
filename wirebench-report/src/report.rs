//! On-Disk Metrics Schema
//!
//! Serde model of the persisted metrics object. Every field carries a
//! default so older files load cleanly; unknown keys are ignored. The same
//! object serves as the export format and as the baseline a later run is
//! judged against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wirebench_core::{MetricsSnapshot, HISTOGRAM_BUCKETS};

/// Complete exported metrics object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsReport {
    /// Wall-clock export time. Reporting only; never enters rate math.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Seconds from measurement start to the snapshot.
    pub elapsed_sec: f64,
    /// Seconds from measurement start to capture end (excludes drain).
    pub capture_elapsed_sec: f64,
    /// Packet counters and rate.
    pub packets: PacketSection,
    /// Byte counters and rate.
    pub bytes: ByteSection,
    /// Error and drop counters.
    pub errors: ErrorSection,
    /// L3 breakdown.
    pub ethertype: EthertypeSection,
    /// L4 breakdown.
    pub protocols: ProtocolSection,
    /// Queue observations.
    pub queue: QueueSection,
    /// Latency aggregates and percentiles.
    pub latency_ns: LatencySection,
    /// Exponential bucket counts.
    pub latency_histogram: Vec<u64>,
    /// Run configuration for baseline compatibility validation. Absent in
    /// files written by older builds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RunMetadata>,
}

/// Packet counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketSection {
    /// Frames counted at capture emission.
    pub captured: u64,
    /// Frames fully processed.
    pub processed: u64,
    /// Processed packets per second over the capture window.
    pub rate_pps: f64,
}

/// Byte counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteSection {
    /// Bytes counted at capture emission.
    pub captured: u64,
    /// Bytes of fully processed frames.
    pub processed: u64,
    /// Processed megabytes per second over the capture window.
    pub rate_mbps: f64,
}

/// Error and drop counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorSection {
    /// Frames that failed header parsing.
    pub parse_errors: u64,
    /// Advisory checksum mismatches.
    pub checksum_failures: u64,
    /// Frames dropped at the full queue.
    pub queue_drops: u64,
    /// Frames truncated or lost at the capture boundary.
    pub capture_drops: u64,
    /// Aggregate drop rate across runs. Written when the file is saved as
    /// a baseline; absent in plain snapshot exports, where the rate is
    /// derived from the counters above.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_rate: Option<f64>,
}

/// L3 counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EthertypeSection {
    /// IPv4 frames.
    pub ipv4: u64,
    /// IPv6 frames.
    pub ipv6: u64,
    /// ARP frames.
    pub arp: u64,
    /// Everything else.
    pub other: u64,
}

/// L4 counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSection {
    /// TCP segments.
    pub tcp: u64,
    /// UDP datagrams.
    pub udp: u64,
    /// ICMP and ICMPv6 messages.
    pub icmp: u64,
    /// Everything else.
    pub other: u64,
}

/// Queue observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    /// Depth high-water mark.
    pub depth_max: u32,
}

/// Latency aggregates in nanoseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencySection {
    /// Number of observations.
    pub count: u64,
    /// Sum of observations.
    pub sum: u64,
    /// Mean observation.
    pub avg: u64,
    /// Largest observation.
    pub max: u64,
    /// 50th percentile (bucket midpoint).
    pub p50: u64,
    /// 95th percentile (bucket midpoint).
    pub p95: u64,
    /// 99th percentile (bucket midpoint).
    pub p99: u64,
}

/// Run configuration captured alongside the metrics.
///
/// A baseline comparison is only meaningful when the must-match subset of
/// these fields agrees between the two runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetadata {
    /// Capture interface name.
    pub interface: String,
    /// Installed filter ("icmp" or "none").
    pub filter: String,
    /// Worker thread count.
    pub threads: u32,
    /// BPF device buffer size (0 where not applicable).
    pub bpf_buffer_size: u32,
    /// Measurement window length in seconds.
    pub duration_sec: u32,
    /// Warmup window length in seconds.
    pub warmup_sec: u32,
    /// Traffic generator mode ("icmp" or "none").
    pub traffic_mode: String,
    /// Traffic generator target address.
    pub traffic_target: String,
    /// Traffic generator rate in packets per second (0 if disabled).
    pub traffic_rate: u32,
    /// Operating system the run executed on.
    pub os: String,
    /// Source revision the binary was built from.
    pub git_sha: String,
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

impl MetricsReport {
    /// Build the export object from a snapshot.
    ///
    /// Rates use the capture window as denominator and are rounded the way
    /// they are reported: pps to 2 decimals, mbps to 4.
    pub fn from_snapshot(snapshot: &MetricsSnapshot, metadata: RunMetadata) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            elapsed_sec: snapshot.elapsed_sec,
            capture_elapsed_sec: snapshot.capture_elapsed_sec,
            packets: PacketSection {
                captured: snapshot.pkts_captured,
                processed: snapshot.pkts_processed,
                rate_pps: round_to(snapshot.pps(), 2),
            },
            bytes: ByteSection {
                captured: snapshot.bytes_captured,
                processed: snapshot.bytes_processed,
                rate_mbps: round_to(snapshot.mbps(), 4),
            },
            errors: ErrorSection {
                parse_errors: snapshot.parse_errors,
                checksum_failures: snapshot.checksum_failures,
                queue_drops: snapshot.queue_drops,
                capture_drops: snapshot.capture_drops,
                drop_rate: None,
            },
            ethertype: EthertypeSection {
                ipv4: snapshot.ether_ipv4,
                ipv6: snapshot.ether_ipv6,
                arp: snapshot.ether_arp,
                other: snapshot.ether_other,
            },
            protocols: ProtocolSection {
                tcp: snapshot.proto_tcp,
                udp: snapshot.proto_udp,
                icmp: snapshot.proto_icmp,
                other: snapshot.proto_other,
            },
            queue: QueueSection {
                depth_max: snapshot.queue_depth_max,
            },
            latency_ns: LatencySection {
                count: snapshot.latency_count,
                sum: snapshot.latency_sum_ns,
                avg: snapshot.avg_latency_ns(),
                max: snapshot.latency_max_ns,
                p50: snapshot.percentile_ns(0.50),
                p95: snapshot.percentile_ns(0.95),
                p99: snapshot.percentile_ns(0.99),
            },
            latency_histogram: snapshot.latency_histogram.to_vec(),
            metadata: Some(metadata),
        }
    }

    /// Elapsed value to divide rates by: the capture window when known,
    /// otherwise the full elapsed time.
    pub fn rate_elapsed_sec(&self) -> f64 {
        if self.capture_elapsed_sec > 0.0 {
            self.capture_elapsed_sec
        } else {
            self.elapsed_sec
        }
    }

    /// Whether the histogram has the expected bucket count.
    pub fn has_full_histogram(&self) -> bool {
        self.latency_histogram.len() == HISTOGRAM_BUCKETS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebench_core::MetricsCore;

    fn sample_snapshot() -> MetricsSnapshot {
        let core = MetricsCore::new();
        core.init();
        core.start();
        for _ in 0..100 {
            core.inc_captured(512);
        }
        for _ in 0..90 {
            core.inc_processed(512);
        }
        for i in 1..=90u64 {
            core.observe_latency(i * 10_000);
        }
        core.record_ethertype(wirebench_core::ETHERTYPE_IPV4);
        core.record_protocol(wirebench_core::PROTO_ICMP);
        core.inc_queue_drops();
        std::thread::sleep(std::time::Duration::from_millis(5));
        core.stop_capture();
        core.snapshot()
    }

    fn sample_metadata() -> RunMetadata {
        RunMetadata {
            interface: "eth0".to_string(),
            filter: "icmp".to_string(),
            threads: 4,
            bpf_buffer_size: 131_072,
            duration_sec: 10,
            warmup_sec: 2,
            traffic_mode: "icmp".to_string(),
            traffic_target: "127.0.0.1".to_string(),
            traffic_rate: 50,
            os: "linux".to_string(),
            git_sha: "abc1234".to_string(),
        }
    }

    #[test]
    fn test_from_snapshot_populates_sections() {
        let report = MetricsReport::from_snapshot(&sample_snapshot(), sample_metadata());
        assert_eq!(report.packets.captured, 100);
        assert_eq!(report.packets.processed, 90);
        assert!(report.packets.rate_pps > 0.0);
        assert_eq!(report.errors.queue_drops, 1);
        assert_eq!(report.latency_ns.count, 90);
        assert!(report.latency_ns.avg > 0);
        assert!(report.latency_ns.p50 <= report.latency_ns.p95);
        assert!(report.latency_ns.p95 <= report.latency_ns.p99);
        assert!(report.has_full_histogram());
        assert!(report.metadata.is_some());
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let report = MetricsReport::from_snapshot(&sample_snapshot(), sample_metadata());
        let json = serde_json::to_string_pretty(&report).unwrap();
        let loaded: MetricsReport = serde_json::from_str(&json).unwrap();
        let rewritten = serde_json::to_string_pretty(&loaded).unwrap();

        // Integers round-trip exactly; the rounded rates are already exact
        // at their serialized precision, so the re-export is byte-identical.
        assert_eq!(json, rewritten);
        assert_eq!(loaded.packets.processed, report.packets.processed);
        assert_eq!(loaded.latency_histogram, report.latency_histogram);
        assert_eq!(loaded.metadata, report.metadata);
        assert_eq!(loaded.packets.rate_pps, report.packets.rate_pps);
        assert_eq!(loaded.bytes.rate_mbps, report.bytes.rate_mbps);
    }

    #[test]
    fn test_missing_keys_default() {
        let loaded: MetricsReport =
            serde_json::from_str(r#"{"packets": {"processed": 42}}"#).unwrap();
        assert_eq!(loaded.packets.processed, 42);
        assert_eq!(loaded.packets.captured, 0);
        assert_eq!(loaded.bytes.rate_mbps, 0.0);
        assert!(loaded.latency_histogram.is_empty());
        assert!(loaded.metadata.is_none());
        assert!(loaded.timestamp.is_none());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let loaded: MetricsReport =
            serde_json::from_str(r#"{"elapsed_sec": 3.0, "future_field": {"x": 1}}"#).unwrap();
        assert_eq!(loaded.elapsed_sec, 3.0);
    }

    #[test]
    fn test_rate_rounding() {
        let report = MetricsReport::from_snapshot(&sample_snapshot(), sample_metadata());
        let pps_scaled = report.packets.rate_pps * 100.0;
        assert!((pps_scaled - pps_scaled.round()).abs() < 1e-9);
        let mbps_scaled = report.bytes.rate_mbps * 10_000.0;
        assert!((mbps_scaled - mbps_scaled.round()).abs() < 1e-9);
    }
}
