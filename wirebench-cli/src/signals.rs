//! Stop Signal Handling
//!
//! `SIGINT`/`SIGTERM` set a process-wide stop flag. The capture loop
//! checks the flag once per iteration, so the current run exits cleanly
//! at its next pass. The handlers are async-signal-safe (they only store
//! an atomic).

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide stop flag set by SIGINT/SIGTERM.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Whether a stop has been requested.
pub fn stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::Relaxed)
}

/// Install SIGINT and SIGTERM handlers that set the stop flag.
#[cfg(unix)]
pub fn install_stop_handlers() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = stop_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn stop_handler(_sig: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::Relaxed);
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn install_stop_handlers() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_starts_clear() {
        // The flag is only ever set by a delivered signal; tests must not
        // send one, so it stays clear here.
        assert!(!stop_requested());
    }

    #[test]
    fn test_install_handlers_does_not_panic() {
        install_stop_handlers();
    }
}
