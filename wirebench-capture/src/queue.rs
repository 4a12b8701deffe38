//! Bounded Frame Queue
//!
//! FIFO hand-off between the capture thread and the worker pool. The
//! producer never blocks: a full queue rejects the frame and the caller
//! accounts the drop. Consumers block on a condition variable until a
//! frame or shutdown arrives; after shutdown they drain whatever is left.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

use wirebench_core::CapturedFrame;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

struct Inner {
    frames: VecDeque<CapturedFrame>,
    shutdown: bool,
}

/// Bounded multi-consumer frame queue.
pub struct FrameQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    available: Condvar,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue a frame without blocking.
    ///
    /// Returns the queue depth after the push, or hands the frame back when
    /// the queue is full or shut down — the caller decides how to account
    /// the drop.
    pub fn push(&self, frame: CapturedFrame) -> Result<usize, CapturedFrame> {
        let mut inner = self.lock();
        if inner.shutdown || inner.frames.len() >= self.capacity {
            return Err(frame);
        }
        inner.frames.push_back(frame);
        let depth = inner.frames.len();
        drop(inner);
        self.available.notify_one();
        Ok(depth)
    }

    /// Dequeue the oldest frame, blocking until one is available.
    ///
    /// Returns `None` only once the queue is shut down *and* empty, so
    /// workers drain remaining frames before exiting.
    pub fn pop(&self) -> Option<CapturedFrame> {
        let mut inner = self.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            if inner.shutdown {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Signal shutdown and wake every blocked consumer. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.shutdown = true;
        drop(inner);
        self.available.notify_all();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether the queue currently holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(tag: u8) -> CapturedFrame {
        CapturedFrame::new(&[tag; 16], 16)
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(10);
        for tag in 0..5u8 {
            queue.push(frame(tag)).unwrap();
        }
        for tag in 0..5u8 {
            let popped = queue.pop().unwrap();
            assert_eq!(popped.data()[0], tag);
        }
    }

    #[test]
    fn test_push_reports_depth() {
        let queue = FrameQueue::new(10);
        assert_eq!(queue.push(frame(0)).unwrap(), 1);
        assert_eq!(queue.push(frame(1)).unwrap(), 2);
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0)).unwrap();
        queue.push(frame(1)).unwrap();
        let rejected = queue.push(frame(2)).unwrap_err();
        assert_eq!(rejected.data()[0], 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_capacity_floor_is_one() {
        let queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(frame(0)).unwrap();
        assert!(queue.push(frame(1)).is_err());
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumer() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.pop())
        };
        std::thread::sleep(Duration::from_millis(50));
        queue.shutdown();
        assert!(consumer.join().expect("consumer panicked").is_none());
    }

    #[test]
    fn test_drain_after_shutdown() {
        let queue = FrameQueue::new(10);
        queue.push(frame(0)).unwrap();
        queue.push(frame(1)).unwrap();
        queue.shutdown();

        // Remaining frames drain before the shutdown signal surfaces.
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_push_after_shutdown_rejected() {
        let queue = FrameQueue::new(10);
        queue.shutdown();
        assert!(queue.push(frame(0)).is_err());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let queue = FrameQueue::new(2);
        queue.shutdown();
        queue.shutdown();
        assert!(queue.is_shutdown());
    }

    #[test]
    fn test_concurrent_producers_consumers() {
        let queue = Arc::new(FrameQueue::new(64));
        let consumed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let consumed = Arc::clone(&consumed);
                std::thread::spawn(move || {
                    while queue.pop().is_some() {
                        consumed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                })
            })
            .collect();

        let mut pushed = 0usize;
        for tag in 0..500u16 {
            if queue.push(frame(tag as u8)).is_ok() {
                pushed += 1;
            } else {
                std::thread::sleep(Duration::from_micros(100));
            }
        }
        queue.shutdown();
        for consumer in consumers {
            consumer.join().expect("consumer panicked");
        }

        assert_eq!(consumed.load(std::sync::atomic::Ordering::Relaxed), pushed);
        assert!(queue.is_empty());
    }
}
