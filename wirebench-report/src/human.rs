//! Human-Readable Formatting
//!
//! One-line summaries printed during and after a measurement run, plus the
//! latency autoscaling shared by the regression report.

use wirebench_core::MetricsSnapshot;

/// Format a nanosecond latency with an autoscaled unit.
pub fn format_latency(ns: u64) -> String {
    if ns < 1_000 {
        format!("{ns}ns")
    } else if ns < 1_000_000 {
        format!("{:.1}µs", ns as f64 / 1_000.0)
    } else if ns < 1_000_000_000 {
        format!("{:.2}ms", ns as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", ns as f64 / 1_000_000_000.0)
    }
}

/// End-of-run summary line.
pub fn run_summary(snapshot: &MetricsSnapshot) -> String {
    format!(
        "[METRICS] {:.1}s | pkts: {} ({:.0}/s) | {:.2} MB/s | drops: {} | latency p50/p95/p99/max: {}/{}/{}/{}",
        snapshot.elapsed_sec,
        snapshot.pkts_processed,
        snapshot.pps(),
        snapshot.mbps(),
        snapshot.total_drops(),
        format_latency(snapshot.percentile_ns(0.50)),
        format_latency(snapshot.percentile_ns(0.95)),
        format_latency(snapshot.percentile_ns(0.99)),
        format_latency(snapshot.latency_max_ns),
    )
}

/// Protocol breakdown line accompanying the run summary.
pub fn protocol_breakdown(snapshot: &MetricsSnapshot) -> String {
    format!(
        "[PROTO] L3: IPv4={} IPv6={} ARP={} other={} | L4: TCP={} UDP={} ICMP={} other={}",
        snapshot.ether_ipv4,
        snapshot.ether_ipv6,
        snapshot.ether_arp,
        snapshot.ether_other,
        snapshot.proto_tcp,
        snapshot.proto_udp,
        snapshot.proto_icmp,
        snapshot.proto_other,
    )
}

/// Compact line emitted periodically while capture is running.
///
/// Uses captured counters so the line moves even when workers lag behind.
pub fn live_stats(snapshot: &MetricsSnapshot) -> String {
    let pps = if snapshot.capture_elapsed_sec > 0.0 {
        snapshot.pkts_captured as f64 / snapshot.capture_elapsed_sec
    } else {
        0.0
    };
    let mbps = if snapshot.capture_elapsed_sec > 0.0 {
        snapshot.bytes_captured as f64 / snapshot.capture_elapsed_sec / (1024.0 * 1024.0)
    } else {
        0.0
    };
    format!(
        "[METRICS] t={:.1} pkts={} pps={:.0} MB/s={:.2} drops={}",
        snapshot.elapsed_sec,
        snapshot.pkts_captured,
        pps,
        mbps,
        snapshot.total_drops(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebench_core::MetricsCore;

    #[test]
    fn test_format_latency_units() {
        assert_eq!(format_latency(0), "0ns");
        assert_eq!(format_latency(999), "999ns");
        assert_eq!(format_latency(1_500), "1.5µs");
        assert_eq!(format_latency(2_500_000), "2.50ms");
        assert_eq!(format_latency(3_000_000_000), "3.00s");
    }

    #[test]
    fn test_summary_lines_render() {
        let core = MetricsCore::new();
        core.init();
        core.start();
        core.inc_captured(100);
        core.inc_processed(100);
        core.observe_latency(50_000);
        core.stop_capture();
        let snapshot = core.snapshot();

        let summary = run_summary(&snapshot);
        assert!(summary.starts_with("[METRICS]"));
        assert!(summary.contains("pkts: 1"));

        let protocols = protocol_breakdown(&snapshot);
        assert!(protocols.contains("L3:"));
        assert!(protocols.contains("L4:"));

        let live = live_stats(&snapshot);
        assert!(live.contains("pkts=1"));
    }
}
