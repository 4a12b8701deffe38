#![warn(missing_docs)]
//! Wirebench Capture - Kernel Capture Pipeline
//!
//! Everything between the kernel and the metrics core:
//! - [`CaptureEngine`]: AF_PACKET (Linux) and BPF-device (macOS/FreeBSD)
//!   backends emitting arrival-stamped frames
//! - [`FilterKind`]: the in-kernel ICMP/ICMPv6 classifier
//! - [`decode`]: fixed-offset protocol header parsing
//! - [`FrameQueue`] + [`WorkerPool`]: bounded hand-off and parallel
//!   decode/record with explicit drop accounting

mod decode;
mod engine;
mod filter;
mod pool;
mod queue;

pub use decode::{
    decode, DecodeError, DecodedFrame, ETHERNET_HEADER_LEN, IPV4_MIN_HEADER_LEN, IPV6_HEADER_LEN,
    TCP_MIN_HEADER_LEN, UDP_HEADER_LEN,
};
pub use engine::{CaptureConfig, CaptureEngine, CaptureError, DEFAULT_BUFFER_SIZE};
pub use filter::{BpfInsn, FilterKind};
pub use pool::{process_frame, WorkerPool, DEFAULT_WORKERS};
pub use queue::{FrameQueue, DEFAULT_QUEUE_CAPACITY};
