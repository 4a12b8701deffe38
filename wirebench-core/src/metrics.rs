//! Lock-Free Metrics Core
//!
//! Every hot-path counter is an individual atomic; a snapshot is a set of
//! independent atomic loads. Per-field atomicity is sufficient for rate and
//! percentile estimation — cross-field consistency is intentionally not
//! guaranteed.
//!
//! Latency uses a 32-bucket exponential histogram keyed by microseconds:
//! bucket 0 covers [0, 1µs), bucket i in [1, 30] covers [2^(i-1), 2^i) µs,
//! and bucket 31 catches everything from 2^30 µs up.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::clock::now_ns;

/// Number of exponential latency buckets.
pub const HISTOGRAM_BUCKETS: usize = 32;

/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// EtherType for IPv6.
pub const ETHERTYPE_IPV6: u16 = 0x86DD;
/// EtherType for ARP.
pub const ETHERTYPE_ARP: u16 = 0x0806;

/// IP protocol number for TCP.
pub const PROTO_TCP: u8 = 6;
/// IP protocol number for UDP.
pub const PROTO_UDP: u8 = 17;
/// IP protocol number for ICMP.
pub const PROTO_ICMP: u8 = 1;
/// IPv6 next-header value for ICMPv6.
pub const PROTO_ICMPV6: u8 = 58;

/// Histogram bucket index for a latency observation.
///
/// With `µs = ns / 1000`: bucket 0 when `µs == 0`, otherwise
/// `min(floor(log2 µs) + 1, 31)`.
#[inline]
fn latency_bucket(latency_ns: u64) -> usize {
    let us = latency_ns / 1000;
    if us == 0 {
        return 0;
    }
    let bucket = 64 - us.leading_zeros() as usize;
    bucket.min(HISTOGRAM_BUCKETS - 1)
}

/// Process-wide packet metrics.
///
/// All recording operations are thread-safe and lock-free. `init`, `start`
/// and `stop_capture` are writer-exclusive and belong to the measurement
/// controller; workers only read the timing fields through [`snapshot`].
///
/// [`snapshot`]: MetricsCore::snapshot
pub struct MetricsCore {
    pkts_captured: AtomicU64,
    pkts_processed: AtomicU64,
    bytes_captured: AtomicU64,
    bytes_processed: AtomicU64,

    parse_errors: AtomicU64,
    checksum_failures: AtomicU64,
    queue_drops: AtomicU64,
    capture_drops: AtomicU64,

    ether_ipv4: AtomicU64,
    ether_ipv6: AtomicU64,
    ether_arp: AtomicU64,
    ether_other: AtomicU64,

    proto_tcp: AtomicU64,
    proto_udp: AtomicU64,
    proto_icmp: AtomicU64,
    proto_other: AtomicU64,

    queue_depth_max: AtomicU32,

    latency_count: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_max_ns: AtomicU64,
    latency_histogram: [AtomicU64; HISTOGRAM_BUCKETS],

    // Written only by the controller; 0 means unset.
    start_ns: AtomicU64,
    capture_end_ns: AtomicU64,
}

impl MetricsCore {
    /// A zeroed metrics block.
    pub const fn new() -> Self {
        Self {
            pkts_captured: AtomicU64::new(0),
            pkts_processed: AtomicU64::new(0),
            bytes_captured: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
            queue_drops: AtomicU64::new(0),
            capture_drops: AtomicU64::new(0),
            ether_ipv4: AtomicU64::new(0),
            ether_ipv6: AtomicU64::new(0),
            ether_arp: AtomicU64::new(0),
            ether_other: AtomicU64::new(0),
            proto_tcp: AtomicU64::new(0),
            proto_udp: AtomicU64::new(0),
            proto_icmp: AtomicU64::new(0),
            proto_other: AtomicU64::new(0),
            queue_depth_max: AtomicU32::new(0),
            latency_count: AtomicU64::new(0),
            latency_sum_ns: AtomicU64::new(0),
            latency_max_ns: AtomicU64::new(0),
            latency_histogram: [const { AtomicU64::new(0) }; HISTOGRAM_BUCKETS],
            start_ns: AtomicU64::new(0),
            capture_end_ns: AtomicU64::new(0),
        }
    }

    /// Reset every field to zero.
    ///
    /// Called by the controller at each run boundary and at the
    /// warmup-to-measure edge to discard warmup statistics. The final store
    /// is a release so a subsequent `start` publishes a fully zeroed block.
    pub fn init(&self) {
        self.pkts_captured.store(0, Ordering::Relaxed);
        self.pkts_processed.store(0, Ordering::Relaxed);
        self.bytes_captured.store(0, Ordering::Relaxed);
        self.bytes_processed.store(0, Ordering::Relaxed);
        self.parse_errors.store(0, Ordering::Relaxed);
        self.checksum_failures.store(0, Ordering::Relaxed);
        self.queue_drops.store(0, Ordering::Relaxed);
        self.capture_drops.store(0, Ordering::Relaxed);
        self.ether_ipv4.store(0, Ordering::Relaxed);
        self.ether_ipv6.store(0, Ordering::Relaxed);
        self.ether_arp.store(0, Ordering::Relaxed);
        self.ether_other.store(0, Ordering::Relaxed);
        self.proto_tcp.store(0, Ordering::Relaxed);
        self.proto_udp.store(0, Ordering::Relaxed);
        self.proto_icmp.store(0, Ordering::Relaxed);
        self.proto_other.store(0, Ordering::Relaxed);
        self.queue_depth_max.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
        self.latency_sum_ns.store(0, Ordering::Relaxed);
        self.latency_max_ns.store(0, Ordering::Relaxed);
        for bucket in &self.latency_histogram {
            bucket.store(0, Ordering::Relaxed);
        }
        self.capture_end_ns.store(0, Ordering::Relaxed);
        self.start_ns.store(0, Ordering::Release);
    }

    /// Mark the start of the measurement window.
    pub fn start(&self) {
        self.start_ns.store(now_ns(), Ordering::Release);
    }

    /// Mark the end of the capture loop.
    ///
    /// `capture_elapsed_sec` is bounded by `start` and this mark; drain and
    /// shutdown time never enter throughput math.
    pub fn stop_capture(&self) {
        self.capture_end_ns.store(now_ns(), Ordering::Release);
    }

    /// Whether a measurement window is open (`start` has been called).
    #[inline]
    pub fn is_active(&self) -> bool {
        self.start_ns.load(Ordering::Acquire) > 0
    }

    /// Count one captured frame of `bytes` bytes.
    #[inline]
    pub fn inc_captured(&self, bytes: u32) {
        self.pkts_captured.fetch_add(1, Ordering::Relaxed);
        self.bytes_captured.fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    /// Count one fully processed frame of `bytes` bytes.
    #[inline]
    pub fn inc_processed(&self, bytes: u32) {
        self.pkts_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(u64::from(bytes), Ordering::Relaxed);
    }

    /// Count a frame that failed header parsing.
    #[inline]
    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an advisory checksum mismatch.
    #[inline]
    pub fn inc_checksum_failures(&self) {
        self.checksum_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame dropped at the full processing queue.
    #[inline]
    pub fn inc_queue_drops(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame truncated or lost at the capture boundary.
    #[inline]
    pub fn inc_capture_drops(&self) {
        self.capture_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Bucket a frame by EtherType.
    pub fn record_ethertype(&self, ethertype: u16) {
        let counter = match ethertype {
            ETHERTYPE_IPV4 => &self.ether_ipv4,
            ETHERTYPE_IPV6 => &self.ether_ipv6,
            ETHERTYPE_ARP => &self.ether_arp,
            _ => &self.ether_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Bucket a frame by L4 protocol number. ICMP and ICMPv6 share a bucket.
    pub fn record_protocol(&self, protocol: u8) {
        let counter = match protocol {
            PROTO_TCP => &self.proto_tcp,
            PROTO_UDP => &self.proto_udp,
            PROTO_ICMP | PROTO_ICMPV6 => &self.proto_icmp,
            _ => &self.proto_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one end-to-end latency observation.
    pub fn observe_latency(&self, latency_ns: u64) {
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ns.fetch_add(latency_ns, Ordering::Relaxed);

        let mut current_max = self.latency_max_ns.load(Ordering::Relaxed);
        while latency_ns > current_max {
            match self.latency_max_ns.compare_exchange_weak(
                current_max,
                latency_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }

        self.latency_histogram[latency_bucket(latency_ns)].fetch_add(1, Ordering::Relaxed);
    }

    /// Raise the queue depth high-water mark.
    pub fn update_queue_depth_max(&self, depth: u32) {
        let mut current_max = self.queue_depth_max.load(Ordering::Relaxed);
        while depth > current_max {
            match self.queue_depth_max.compare_exchange_weak(
                current_max,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }
    }

    /// Load every field independently into a point-in-time snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let snapshot_ns = now_ns();
        let start_ns = self.start_ns.load(Ordering::Acquire);
        let capture_end_ns = self.capture_end_ns.load(Ordering::Acquire);

        let elapsed_sec = if start_ns > 0 {
            (snapshot_ns.saturating_sub(start_ns)) as f64 / 1e9
        } else {
            0.0
        };
        // Capture-only window; falls back to wall elapsed while capture runs.
        let capture_elapsed_sec = if start_ns > 0 && capture_end_ns > 0 {
            (capture_end_ns.saturating_sub(start_ns)) as f64 / 1e9
        } else {
            elapsed_sec
        };

        let mut latency_histogram = [0u64; HISTOGRAM_BUCKETS];
        for (slot, bucket) in latency_histogram.iter_mut().zip(&self.latency_histogram) {
            *slot = bucket.load(Ordering::Relaxed);
        }

        MetricsSnapshot {
            snapshot_ns,
            start_ns,
            capture_end_ns,
            elapsed_sec,
            capture_elapsed_sec,
            pkts_captured: self.pkts_captured.load(Ordering::Relaxed),
            pkts_processed: self.pkts_processed.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            capture_drops: self.capture_drops.load(Ordering::Relaxed),
            ether_ipv4: self.ether_ipv4.load(Ordering::Relaxed),
            ether_ipv6: self.ether_ipv6.load(Ordering::Relaxed),
            ether_arp: self.ether_arp.load(Ordering::Relaxed),
            ether_other: self.ether_other.load(Ordering::Relaxed),
            proto_tcp: self.proto_tcp.load(Ordering::Relaxed),
            proto_udp: self.proto_udp.load(Ordering::Relaxed),
            proto_icmp: self.proto_icmp.load(Ordering::Relaxed),
            proto_other: self.proto_other.load(Ordering::Relaxed),
            queue_depth_max: self.queue_depth_max.load(Ordering::Relaxed),
            latency_count: self.latency_count.load(Ordering::Relaxed),
            latency_sum_ns: self.latency_sum_ns.load(Ordering::Relaxed),
            latency_max_ns: self.latency_max_ns.load(Ordering::Relaxed),
            latency_histogram,
        }
    }
}

impl Default for MetricsCore {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide metrics instance.
pub fn metrics() -> &'static MetricsCore {
    static METRICS: MetricsCore = MetricsCore::new();
    &METRICS
}

/// Point-in-time copy of all metrics fields.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    pub snapshot_ns: u64,
    /// Measurement start mark (0 when the window never opened).
    pub start_ns: u64,
    /// Capture end mark (0 while capture is still running).
    pub capture_end_ns: u64,
    /// Seconds from `start` to this snapshot.
    pub elapsed_sec: f64,
    /// Seconds from `start` to `stop_capture`; equals `elapsed_sec` while
    /// capture is still running. The only legal throughput denominator.
    pub capture_elapsed_sec: f64,

    /// Frames counted at capture emission.
    pub pkts_captured: u64,
    /// Frames fully decoded and recorded.
    pub pkts_processed: u64,
    /// Bytes counted at capture emission.
    pub bytes_captured: u64,
    /// Bytes of fully processed frames.
    pub bytes_processed: u64,

    /// Frames that failed header parsing.
    pub parse_errors: u64,
    /// Advisory checksum mismatches.
    pub checksum_failures: u64,
    /// Frames dropped at the full queue.
    pub queue_drops: u64,
    /// Frames truncated or lost at the capture boundary.
    pub capture_drops: u64,

    /// IPv4 frames.
    pub ether_ipv4: u64,
    /// IPv6 frames.
    pub ether_ipv6: u64,
    /// ARP frames.
    pub ether_arp: u64,
    /// Frames of any other EtherType.
    pub ether_other: u64,

    /// TCP segments.
    pub proto_tcp: u64,
    /// UDP datagrams.
    pub proto_udp: u64,
    /// ICMP and ICMPv6 messages.
    pub proto_icmp: u64,
    /// Any other L4 protocol.
    pub proto_other: u64,

    /// Queue depth high-water mark.
    pub queue_depth_max: u32,

    /// Number of latency observations.
    pub latency_count: u64,
    /// Sum of observed latencies in nanoseconds.
    pub latency_sum_ns: u64,
    /// Largest observed latency in nanoseconds.
    pub latency_max_ns: u64,
    /// Exponential bucket counts; sums to `latency_count`.
    pub latency_histogram: [u64; HISTOGRAM_BUCKETS],
}

impl MetricsSnapshot {
    /// Latency percentile in nanoseconds from the histogram.
    ///
    /// Walks buckets in order and returns the midpoint of the first bucket
    /// whose cumulative count reaches `percentile * count`: bucket 0 maps
    /// to 500 ns, bucket i to `((2^(i-1) + 2^i) / 2) * 1000` ns. Returns 0
    /// for an empty histogram and `latency_max_ns` if the walk falls
    /// through.
    pub fn percentile_ns(&self, percentile: f64) -> u64 {
        if self.latency_count == 0 {
            return 0;
        }

        let target = percentile * self.latency_count as f64;
        let mut cumulative = 0u64;

        for (i, &count) in self.latency_histogram.iter().enumerate() {
            cumulative += count;
            if cumulative as f64 >= target {
                if i == 0 {
                    return 500;
                }
                let low_us = 1u64 << (i - 1);
                let high_us = 1u64 << i;
                return ((low_us + high_us) / 2) * 1000;
            }
        }

        self.latency_max_ns
    }

    /// Mean latency in nanoseconds (0 when nothing was observed).
    pub fn avg_latency_ns(&self) -> u64 {
        if self.latency_count > 0 {
            self.latency_sum_ns / self.latency_count
        } else {
            0
        }
    }

    /// Processed packets per second over the capture window.
    pub fn pps(&self) -> f64 {
        if self.capture_elapsed_sec > 0.0 {
            self.pkts_processed as f64 / self.capture_elapsed_sec
        } else {
            0.0
        }
    }

    /// Processed megabytes per second over the capture window.
    pub fn mbps(&self) -> f64 {
        if self.capture_elapsed_sec > 0.0 {
            self.bytes_processed as f64 / self.capture_elapsed_sec / (1024.0 * 1024.0)
        } else {
            0.0
        }
    }

    /// Queue plus capture drops.
    pub fn total_drops(&self) -> u64 {
        self.queue_drops + self.capture_drops
    }

    /// Dropped fraction of captured frames (0 when nothing was captured).
    pub fn drop_rate(&self) -> f64 {
        if self.pkts_captured > 0 {
            self.total_drops() as f64 / self.pkts_captured as f64
        } else {
            0.0
        }
    }
}
