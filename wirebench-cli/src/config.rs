//! Configuration loading from wirebench.toml
//!
//! Configuration can be specified in a `wirebench.toml` file in the
//! project root, discovered by walking up from the current directory.
//! CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Wirebench configuration file model.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WirebenchConfig {
    /// Capture device settings.
    #[serde(default)]
    pub capture: CaptureSection,
    /// Measurement run settings.
    #[serde(default)]
    pub run: RunSection,
    /// Traffic generator settings.
    #[serde(default)]
    pub traffic: TrafficSection,
    /// Regression gate settings.
    #[serde(default)]
    pub regression: RegressionSection,
    /// Output settings.
    #[serde(default)]
    pub output: OutputSection,
}

/// Capture device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSection {
    /// Interface to capture on.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Number of processing worker threads.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Bounded queue capacity between capture and workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// BPF device read-buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Enable promiscuous mode.
    #[serde(default)]
    pub promiscuous: bool,
    /// Kernel filter: "icmp" or "none".
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            threads: default_threads(),
            queue_capacity: default_queue_capacity(),
            buffer_size: default_buffer_size(),
            promiscuous: false,
            filter: default_filter(),
        }
    }
}

fn default_interface() -> String {
    "eth0".to_string()
}
fn default_threads() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    100
}
fn default_buffer_size() -> usize {
    128 * 1024
}
fn default_filter() -> String {
    "none".to_string()
}

/// Measurement run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Number of independent measurement runs.
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Warmup window in seconds (0 skips warmup).
    #[serde(default)]
    pub warmup_sec: u64,
    /// Measurement window in seconds (0 = unlimited).
    #[serde(default = "default_duration")]
    pub duration_sec: u64,
    /// Per-run packet-count limit (0 = unlimited).
    #[serde(default)]
    pub count: u64,
    /// Minimum total processed packets across all runs.
    #[serde(default)]
    pub min_packets: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            runs: default_runs(),
            warmup_sec: 0,
            duration_sec: default_duration(),
            count: 0,
            min_packets: 0,
        }
    }
}

fn default_runs() -> usize {
    1
}
fn default_duration() -> u64 {
    10
}

/// Traffic generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficSection {
    /// Generator mode: "icmp" or "none".
    #[serde(default = "default_traffic_mode")]
    pub mode: String,
    /// Target address for generated traffic.
    #[serde(default)]
    pub target: String,
    /// Generated packets per second.
    #[serde(default = "default_traffic_rate")]
    pub rate: u32,
}

impl Default for TrafficSection {
    fn default() -> Self {
        Self {
            mode: default_traffic_mode(),
            target: String::new(),
            rate: default_traffic_rate(),
        }
    }
}

fn default_traffic_mode() -> String {
    "none".to_string()
}
fn default_traffic_rate() -> u32 {
    50
}

/// Regression gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionSection {
    /// Regression threshold as a fraction (0.10 = 10%).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Map a persistent regression or metadata mismatch to a failing exit code.
    #[serde(default = "default_fail_on_regression")]
    pub fail_on_regression: bool,
}

impl Default for RegressionSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            fail_on_regression: default_fail_on_regression(),
        }
    }
}

fn default_threshold() -> f64 {
    0.10
}
fn default_fail_on_regression() -> bool {
    true
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSection {
    /// Write the final metrics snapshot as JSON to this path.
    #[serde(default)]
    pub json_path: Option<String>,
    /// Save the aggregate as a baseline to this path.
    #[serde(default)]
    pub baseline_path: Option<String>,
}

impl WirebenchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Discover and load configuration by walking up from the current directory.
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("wirebench.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Default configuration as a TOML template.
    pub fn default_toml() -> String {
        r#"# Wirebench Configuration

[capture]
# Interface to capture on
interface = "eth0"
# Processing worker threads
threads = 4
# Bounded queue capacity
queue_capacity = 100
# BPF read-buffer size in bytes (BSD/macOS)
buffer_size = 131072
# Promiscuous mode
promiscuous = false
# Kernel filter: "icmp" or "none"
filter = "none"

[run]
# Independent measurement runs, aggregated by median
runs = 1
# Warmup seconds before each measurement window (0 skips warmup)
warmup_sec = 0
# Measurement window seconds (0 = until signal or packet limit)
duration_sec = 10
# Per-run packet-count limit (0 = unlimited)
count = 0
# Minimum total processed packets for a valid aggregate
min_packets = 0

[traffic]
# External traffic generator: "icmp" or "none"
mode = "none"
# Target address (e.g. "127.0.0.1")
target = ""
# Generated packets per second
rate = 50

[regression]
# Regression threshold as a fraction
threshold = 0.10
# Fail the exit code on persistent regression / metadata mismatch
fail_on_regression = true

[output]
# Write the final metrics snapshot as JSON (uncomment to enable)
# json_path = "metrics.json"
# Save the aggregate as a baseline (uncomment to enable)
# baseline_path = "baseline.json"
"#
        .to_string()
    }
}
