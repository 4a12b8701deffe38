//! Monotonic Clock
//!
//! Single time source for every duration and latency in wirebench.
//! Wall-clock time never enters throughput math; it appears only in
//! report metadata.

use std::sync::OnceLock;
use std::time::Instant;

fn anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

/// Current monotonic timestamp in nanoseconds since process start.
///
/// Never returns 0: a zero timestamp is reserved to mean "unset"
/// (e.g. `start_ns` before measurement begins).
#[inline(always)]
pub fn now_ns() -> u64 {
    (anchor().elapsed().as_nanos() as u64).max(1)
}
