//! Traffic Generator Adapter
//!
//! Drives an external ping utility per measurement run. The generator is
//! strictly a collaborator: if it fails to start, the run proceeds and the
//! failure is a warning. Shutdown escalates INT → TERM → KILL with short
//! grace periods so a wedged child cannot stall the harness.

use std::io;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Grace period after SIGINT before escalating.
const INT_GRACE: Duration = Duration::from_millis(200);
/// Grace period after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_millis(100);

/// Requested traffic generation for a run.
#[derive(Debug, Clone)]
pub struct TrafficSettings {
    /// Generator mode: "icmp" or "none".
    pub mode: String,
    /// Target address.
    pub target: String,
    /// Packets per second.
    pub rate: u32,
}

impl TrafficSettings {
    /// Whether a generator should be started at all.
    pub fn enabled(&self) -> bool {
        self.mode == "icmp" && !self.target.is_empty()
    }
}

/// Why the generator could not be started.
#[derive(Debug, Error)]
pub enum TrafficError {
    /// The ping process could not be spawned.
    #[error("failed to spawn traffic generator: {0}")]
    Spawn(#[from] io::Error),
}

/// Handle to a running traffic generator child process.
pub struct TrafficGenerator {
    child: Child,
}

impl TrafficGenerator {
    /// Start the generator if configured; a start failure is reported as a
    /// warning and the run continues without traffic.
    pub fn start_if_configured(settings: &TrafficSettings) -> Option<Self> {
        if !settings.enabled() {
            return None;
        }
        match Self::start(settings) {
            Ok(generator) => Some(generator),
            Err(e) => {
                warn!("traffic generator failed to start, continuing without it: {e}");
                None
            }
        }
    }

    /// Spawn the ping child at the configured rate.
    pub fn start(settings: &TrafficSettings) -> Result<Self, TrafficError> {
        let interval = 1.0 / f64::from(settings.rate.max(1));
        let child = Command::new("ping")
            .arg("-i")
            .arg(format!("{interval:.3}"))
            .arg(&settings.target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        debug!(
            target = %settings.target,
            rate = settings.rate,
            pid = child.id(),
            "traffic generator started"
        );
        Ok(Self { child })
    }

    /// Stop the generator: INT, then TERM, then KILL.
    pub fn stop(mut self) {
        self.signal(libc::SIGINT);
        if self.wait_exit(INT_GRACE) {
            return;
        }
        self.signal(libc::SIGTERM);
        if self.wait_exit(TERM_GRACE) {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("traffic generator killed");
    }

    #[cfg(unix)]
    fn signal(&self, sig: libc::c_int) {
        // SAFETY: kill(2) with the child's pid; a stale pid at worst
        // returns ESRCH, which we ignore.
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, sig);
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _sig: i32) {}

    /// Poll for exit until the grace period lapses.
    fn wait_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(_) => return true,
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for TrafficGenerator {
    fn drop(&mut self) {
        // A generator that was not stopped explicitly must not outlive us.
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
