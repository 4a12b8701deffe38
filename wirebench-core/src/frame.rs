//! Captured Frames
//!
//! A frame is lifted out of the kernel buffer exactly once, stamped with
//! its arrival time, and owns its bytes from then on. Decoders work on
//! borrowed views into the buffer; nothing on the hot path re-allocates.

use crate::clock::now_ns;

/// Upper bound on bytes retained for a single frame (maximum IP datagram).
pub const MAX_FRAME_SIZE: usize = 65_535;

/// A link-layer frame with its capture timestamp.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Monotonic arrival timestamp, stamped when the frame was emitted
    /// from the kernel buffer (not when the read completed).
    pub arrival_ns: u64,
    /// Length on the wire, which may exceed the captured length after
    /// truncation.
    pub wire_len: u32,
    data: Vec<u8>,
}

impl CapturedFrame {
    /// Build a frame from captured bytes, stamping the arrival time now.
    ///
    /// `wire_len` is the original on-wire length; callers pass the captured
    /// slice already truncated to their buffer limit.
    pub fn new(data: &[u8], wire_len: u32) -> Self {
        let kept = data.len().min(MAX_FRAME_SIZE);
        Self {
            arrival_ns: now_ns(),
            wire_len,
            data: data[..kept].to_vec(),
        }
    }

    /// Captured bytes (possibly fewer than `wire_len`).
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes actually captured.
    #[inline]
    pub fn captured_len(&self) -> u32 {
        self.data.len() as u32
    }

    /// Whether the kernel or the capture buffer cut this frame short.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.captured_len() < self.wire_len
    }
}
