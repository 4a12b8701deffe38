//! Worker Pool
//!
//! N threads drain the bounded queue, decode each frame and record
//! metrics. Decode failures are counted and swallowed; nothing a frame
//! contains can take a worker down.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::debug;
use wirebench_core::{now_ns, CapturedFrame, MetricsCore};

use crate::decode::decode;
use crate::queue::FrameQueue;

/// Default number of processing workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Handle to the running worker threads.
pub struct WorkerPool {
    queue: Arc<FrameQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads consuming `queue`.
    pub fn spawn(queue: Arc<FrameQueue>, workers: usize, metrics: &'static MetricsCore) -> Self {
        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|i| {
                let queue = Arc::clone(&queue);
                std::thread::Builder::new()
                    .name(format!("wirebench-worker-{i}"))
                    .spawn(move || worker_loop(&queue, metrics))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        debug!(workers, "worker pool started");
        Self { queue, handles }
    }

    /// Number of running workers.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown, let workers drain the queue, and join them.
    pub fn shutdown(self) {
        self.queue.shutdown();
        for handle in self.handles {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop(queue: &FrameQueue, metrics: &MetricsCore) {
    while let Some(frame) = queue.pop() {
        process_frame(&frame, metrics);
    }
}

/// Decode one frame and record its metrics.
///
/// Decoding always runs (it keeps caches warm through warmup), but nothing
/// is recorded outside an open measurement window. Recording order within
/// a worker is ethertype, then L4 protocol, then latency, then processed.
pub fn process_frame(frame: &CapturedFrame, metrics: &MetricsCore) {
    let decoded = decode(frame.data());

    if !metrics.is_active() {
        return;
    }

    match decoded {
        Ok(view) => {
            metrics.record_ethertype(view.ethertype);
            if let Some(protocol) = view.l4_protocol {
                metrics.record_protocol(protocol);
            }
            if !view.checksum_ok {
                metrics.inc_checksum_failures();
            }
            metrics.observe_latency(now_ns().saturating_sub(frame.arrival_ns));
            metrics.inc_processed(frame.captured_len());
        }
        Err(_) => {
            metrics.inc_parse_errors();
        }
    }
}
