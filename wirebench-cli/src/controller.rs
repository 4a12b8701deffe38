//! Measurement Controller
//!
//! Sequences the per-run phase machine: Idle → Warmup → Measure → Drain →
//! Reported. Warmup statistics are discarded by re-initializing the
//! metrics block at the warmup-to-measure edge, so only the measurement
//! window ever reaches the aggregator. Throughput uses the capture window
//! as its denominator; drain time never enters the math.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use wirebench_capture::{CaptureEngine, CaptureError, FrameQueue};
use wirebench_core::{now_ns, CapturedFrame, MetricsCore};
use wirebench_report::human;
use wirebench_stats::RunResult;

use crate::signals::stop_requested;
use crate::traffic::{TrafficGenerator, TrafficSettings};

/// Sleep between empty polls.
const IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Queue drain period after capture stops.
const DRAIN_SLEEP: Duration = Duration::from_millis(500);
/// Interval between live stats lines.
const LIVE_STATS_INTERVAL_NS: u64 = 1_000_000_000;

/// Source of captured frames the controller polls.
///
/// The capture engine is the production implementation; tests drive the
/// controller with scripted sources.
pub trait FrameSource {
    /// Append available frames to `out`; zero means "no packet right now".
    fn poll(&mut self, out: &mut Vec<CapturedFrame>) -> Result<usize, CaptureError>;
}

impl FrameSource for CaptureEngine {
    fn poll(&mut self, out: &mut Vec<CapturedFrame>) -> Result<usize, CaptureError> {
        CaptureEngine::poll(self, out)
    }
}

/// Timing and limits for the measurement runs.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Number of independent runs.
    pub runs: usize,
    /// Warmup window per run in seconds (0 skips warmup).
    pub warmup_sec: u64,
    /// Measurement window per run in seconds (0 = unlimited).
    pub duration_sec: u64,
    /// Per-run captured-packet limit (0 = unlimited).
    pub packet_limit: u64,
    /// Emit periodic live stats lines during measurement.
    pub live_stats: bool,
}

/// Drives capture, queue and metrics through N measurement runs.
pub struct Controller<S: FrameSource> {
    source: S,
    queue: Arc<FrameQueue>,
    metrics: &'static MetricsCore,
    plan: RunPlan,
    traffic: TrafficSettings,
}

impl<S: FrameSource> Controller<S> {
    /// Build a controller over an open frame source and running queue.
    pub fn new(
        source: S,
        queue: Arc<FrameQueue>,
        metrics: &'static MetricsCore,
        plan: RunPlan,
        traffic: TrafficSettings,
    ) -> Self {
        Self {
            source,
            queue,
            metrics,
            plan,
            traffic,
        }
    }

    /// Execute every planned run, printing a summary after each.
    ///
    /// A stop request ends the sequence after the current run; a capture
    /// error terminates the current run and propagates.
    pub fn run_all(&mut self) -> Result<Vec<RunResult>, CaptureError> {
        let mut results = Vec::with_capacity(self.plan.runs);
        for run in 1..=self.plan.runs.max(1) {
            if stop_requested() {
                info!(run, "stop requested, skipping remaining runs");
                break;
            }
            info!(run, total = self.plan.runs, "measurement run starting");
            let result = self.run_once(run)?;

            let snapshot = self.metrics.snapshot();
            println!("{}", human::run_summary(&snapshot));
            println!("{}", human::protocol_breakdown(&snapshot));

            results.push(result);
        }
        Ok(results)
    }

    /// One pass of the phase machine.
    fn run_once(&mut self, run: usize) -> Result<RunResult, CaptureError> {
        self.metrics.init();

        let mut traffic = TrafficGenerator::start_if_configured(&self.traffic);

        let phase_start = now_ns();
        let warmup_end = phase_start + self.plan.warmup_sec * 1_000_000_000;
        let measure_len = self.plan.duration_sec * 1_000_000_000;
        let measure_end = if measure_len > 0 {
            warmup_end + measure_len
        } else {
            0
        };

        let mut in_warmup = self.plan.warmup_sec > 0;
        if !in_warmup {
            // Warmup skipped: the measurement window opens immediately.
            self.metrics.start();
        }

        let mut captured_count: u64 = 0;
        let mut scratch: Vec<CapturedFrame> = Vec::new();
        let mut last_live = phase_start;

        let capture_result = loop {
            if stop_requested() {
                break Ok(());
            }

            let t = now_ns();
            if in_warmup && t >= warmup_end {
                // Discard warmup statistics and open the window.
                self.metrics.init();
                self.metrics.start();
                in_warmup = false;
                debug!(run, "warmup complete, measurement window open");
            }
            if !in_warmup && measure_end > 0 && t >= measure_end {
                break Ok(());
            }

            match self.source.poll(&mut scratch) {
                Ok(0) => {
                    std::thread::sleep(IDLE_SLEEP);
                }
                Ok(_) => {
                    let active = self.metrics.is_active();
                    for frame in scratch.drain(..) {
                        captured_count += 1;
                        if active {
                            self.metrics.inc_captured(frame.captured_len());
                        }
                        match self.queue.push(frame) {
                            Ok(depth) => {
                                if active {
                                    self.metrics.update_queue_depth_max(depth as u32);
                                }
                            }
                            Err(_dropped) => {
                                if active {
                                    self.metrics.inc_queue_drops();
                                }
                            }
                        }
                    }
                }
                Err(e) => break Err(e),
            }

            if self.plan.packet_limit > 0 && captured_count >= self.plan.packet_limit {
                debug!(run, captured_count, "packet limit reached");
                break Ok(());
            }

            if self.plan.live_stats && !in_warmup && t.saturating_sub(last_live) >= LIVE_STATS_INTERVAL_NS
            {
                println!("{}", human::live_stats(&self.metrics.snapshot()));
                last_live = t;
            }
        };

        self.metrics.stop_capture();
        if let Some(generator) = traffic.take() {
            generator.stop();
        }
        capture_result?;

        // Let workers drain what is already queued before the snapshot.
        std::thread::sleep(DRAIN_SLEEP);

        Ok(RunResult::from_snapshot(run, &self.metrics.snapshot()))
    }
}
