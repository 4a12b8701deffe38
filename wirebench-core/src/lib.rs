#![warn(missing_docs)]
//! Wirebench Core - Metrics Runtime
//!
//! This crate provides the measurement substrate shared by the capture
//! pipeline and the regression tooling:
//! - A monotonic nanosecond clock (the only source for durations)
//! - The lock-free [`MetricsCore`] with counters, latency histogram and
//!   snapshot protocol
//! - The owned [`CapturedFrame`] handed from capture to the worker pool

mod clock;
mod frame;
mod metrics;

pub use clock::now_ns;
pub use frame::{CapturedFrame, MAX_FRAME_SIZE};
pub use metrics::{
    metrics, MetricsCore, MetricsSnapshot, ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6,
    HISTOGRAM_BUCKETS, PROTO_ICMP, PROTO_ICMPV6, PROTO_TCP, PROTO_UDP,
};
