#![warn(missing_docs)]
//! Wirebench CLI Library
//!
//! Wires the capture pipeline, measurement controller and regression judge
//! into the `wirebench` binary: configuration layering (wirebench.toml +
//! flags), run sequencing, baseline validation and the exit-code contract
//! CI depends on.

mod config;
mod controller;
mod metadata;
mod render;
mod signals;
mod traffic;

pub use config::WirebenchConfig;
pub use controller::{Controller, FrameSource, RunPlan};
pub use signals::{install_stop_handlers, stop_requested};
pub use traffic::{TrafficError, TrafficGenerator, TrafficSettings};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use wirebench_capture::{CaptureConfig, CaptureEngine, FilterKind, FrameQueue, WorkerPool};
use wirebench_core::MAX_FRAME_SIZE;
use wirebench_report::{generate_json_report, human, Baseline, MetricsReport};
use wirebench_stats::{aggregate, judge, validate_metadata, Aggregate, Outcome};

/// Success / no regression.
pub const EXIT_OK: i32 = 0;
/// Any error outside the dedicated codes below.
pub const EXIT_FAILURE: i32 = 1;
/// Persistent regression detected.
pub const EXIT_REGRESSION: i32 = 2;
/// Fewer packets processed than `min_packets`.
pub const EXIT_INSUFFICIENT: i32 = 3;
/// Baseline metadata mismatch on a must-match field.
pub const EXIT_CONFIG_MISMATCH: i32 = 4;

/// Process exit code for a measurement outcome.
pub fn exit_code(outcome: Outcome) -> i32 {
    match outcome {
        Outcome::Pass => EXIT_OK,
        Outcome::Regression => EXIT_REGRESSION,
        Outcome::Insufficient => EXIT_INSUFFICIENT,
        Outcome::MetadataMismatch => EXIT_CONFIG_MISMATCH,
    }
}

/// Wirebench CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "wirebench")]
#[command(author, version, about = "Wirebench - packet capture benchmark harness for CI regression gating")]
pub struct Cli {
    /// Network interface to capture on
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Number of processing worker threads
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Bounded queue capacity between capture and workers
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// BPF read-buffer size in bytes (BSD/macOS)
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Enable promiscuous mode
    #[arg(long)]
    pub promiscuous: bool,

    /// Kernel filter: "icmp" or "none"
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Number of independent measurement runs
    #[arg(short, long)]
    pub runs: Option<usize>,

    /// Warmup seconds before each measurement window (0 skips warmup)
    #[arg(short, long)]
    pub warmup: Option<u64>,

    /// Measurement window in seconds (0 = until signal or packet limit)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Per-run packet-count limit (0 = unlimited)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Minimum total processed packets for a valid aggregate
    #[arg(long)]
    pub min_packets: Option<u64>,

    /// Traffic generator mode: "icmp" or "none"
    #[arg(long)]
    pub traffic: Option<String>,

    /// Traffic generator target address
    #[arg(long)]
    pub traffic_target: Option<String>,

    /// Traffic generator rate in packets per second
    #[arg(long)]
    pub traffic_rate: Option<u32>,

    /// Compare the aggregate against this baseline file
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Save the aggregate as a baseline
    /// Optionally specify a path; defaults to config or baseline.json
    #[arg(long)]
    pub save_baseline: Option<Option<PathBuf>>,

    /// Regression threshold as a fraction (0.10 = 10%)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Map persistent regression / metadata mismatch to a failing exit code
    /// Use --fail-on-regression=false to report without gating
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    pub fail_on_regression: bool,

    /// Write the final metrics snapshot as JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suppress periodic live stats lines
    #[arg(long)]
    pub no_live_stats: bool,

    /// Print a default wirebench.toml and exit
    #[arg(long)]
    pub print_config: bool,

    /// Verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Fully resolved invocation settings (config file + CLI overrides).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Capture interface.
    pub interface: String,
    /// Worker thread count.
    pub threads: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// BPF read-buffer size.
    pub buffer_size: usize,
    /// Promiscuous mode.
    pub promiscuous: bool,
    /// Kernel filter.
    pub filter: FilterKind,
    /// Number of runs.
    pub runs: usize,
    /// Warmup seconds per run.
    pub warmup_sec: u64,
    /// Measurement seconds per run (0 = unlimited).
    pub duration_sec: u64,
    /// Per-run packet limit (0 = unlimited).
    pub count: u64,
    /// Minimum total processed packets.
    pub min_packets: u64,
    /// Traffic generator settings.
    pub traffic: TrafficSettings,
    /// Regression threshold.
    pub threshold: f64,
    /// Gate the exit code on regression outcomes.
    pub fail_on_regression: bool,
    /// Baseline to compare against.
    pub baseline: Option<PathBuf>,
    /// Where to save the aggregate baseline.
    pub save_baseline: Option<PathBuf>,
    /// Where to write the metrics snapshot JSON.
    pub output: Option<PathBuf>,
    /// Emit periodic live stats lines.
    pub live_stats: bool,
}

impl Settings {
    /// Settings derived from a configuration file alone.
    pub fn from_config(config: &WirebenchConfig) -> Self {
        Self {
            interface: config.capture.interface.clone(),
            threads: config.capture.threads,
            queue_capacity: config.capture.queue_capacity,
            buffer_size: config.capture.buffer_size,
            promiscuous: config.capture.promiscuous,
            filter: config.capture.filter.parse().unwrap_or_default(),
            runs: config.run.runs,
            warmup_sec: config.run.warmup_sec,
            duration_sec: config.run.duration_sec,
            count: config.run.count,
            min_packets: config.run.min_packets,
            traffic: TrafficSettings {
                mode: config.traffic.mode.clone(),
                target: config.traffic.target.clone(),
                rate: config.traffic.rate,
            },
            threshold: config.regression.threshold,
            fail_on_regression: config.regression.fail_on_regression,
            baseline: None,
            save_baseline: config.output.baseline_path.as_ref().map(PathBuf::from),
            output: config.output.json_path.as_ref().map(PathBuf::from),
            live_stats: true,
        }
    }
}

/// Layer CLI flags over the configuration file.
pub fn resolve_settings(cli: &Cli, config: &WirebenchConfig) -> anyhow::Result<Settings> {
    let mut settings = Settings::from_config(config);
    settings.filter = config
        .capture
        .filter
        .parse()
        .map_err(|e: String| anyhow::anyhow!("wirebench.toml: {e}"))?;

    if let Some(interface) = &cli.interface {
        settings.interface = interface.clone();
    }
    if let Some(threads) = cli.threads {
        settings.threads = threads.max(1);
    }
    if let Some(capacity) = cli.queue_capacity {
        settings.queue_capacity = capacity;
    }
    if let Some(size) = cli.buffer_size {
        settings.buffer_size = size;
    }
    if cli.promiscuous {
        settings.promiscuous = true;
    }
    if let Some(filter) = &cli.filter {
        settings.filter = filter.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(runs) = cli.runs {
        settings.runs = runs.max(1);
    }
    if let Some(warmup) = cli.warmup {
        settings.warmup_sec = warmup;
    }
    if let Some(duration) = cli.duration {
        settings.duration_sec = duration;
    }
    if let Some(count) = cli.count {
        settings.count = count;
    }
    if let Some(min_packets) = cli.min_packets {
        settings.min_packets = min_packets;
    }
    if let Some(mode) = &cli.traffic {
        settings.traffic.mode = mode.clone();
    }
    if let Some(target) = &cli.traffic_target {
        settings.traffic.target = target.clone();
    }
    if let Some(rate) = cli.traffic_rate {
        settings.traffic.rate = rate;
    }
    if let Some(threshold) = cli.threshold {
        settings.threshold = threshold;
    }
    settings.fail_on_regression = cli.fail_on_regression && config.regression.fail_on_regression;
    settings.baseline = cli.baseline.clone();
    if let Some(save) = &cli.save_baseline {
        settings.save_baseline = Some(
            save.clone()
                .or_else(|| config.output.baseline_path.as_ref().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("baseline.json")),
        );
    }
    if let Some(output) = &cli.output {
        settings.output = Some(output.clone());
    }
    if cli.no_live_stats {
        settings.live_stats = false;
    }

    Ok(settings)
}

/// Fold the cross-run aggregate into a snapshot report before it is saved
/// as a baseline: gated metrics come from the medians, not the final run.
fn apply_aggregate(report: &mut MetricsReport, agg: &Aggregate) {
    report.packets.rate_pps = (agg.pps * 100.0).round() / 100.0;
    report.bytes.rate_mbps = (agg.mbps * 10_000.0).round() / 10_000.0;
    report.latency_ns.p95 = agg.p95_ns.round() as u64;
    report.errors.drop_rate = Some(agg.drop_rate);
}

/// Parse arguments and run the harness. Returns the process exit code.
pub fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the harness with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    if cli.print_config {
        print!("{}", WirebenchConfig::default_toml());
        return Ok(EXIT_OK);
    }

    let level = if cli.verbose { "debug" } else { "info" };
    let env_filter = format!(
        "wirebench_cli={level},wirebench_capture={level},wirebench_core={level},\
         wirebench_report={level},wirebench_stats={level}"
    );
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = WirebenchConfig::discover().unwrap_or_default();
    let settings = resolve_settings(&cli, &config)?;
    install_stop_handlers();

    let run_metadata = metadata::collect_metadata(&settings);
    info!(
        interface = %settings.interface,
        threads = settings.threads,
        runs = settings.runs,
        warmup_sec = settings.warmup_sec,
        duration_sec = settings.duration_sec,
        filter = %settings.filter,
        "wirebench starting"
    );

    // Load and validate the baseline up front so a mismatched configuration
    // fails before any measurement time is spent.
    let mut baseline: Option<Baseline> = None;
    let mut baseline_load_failed = false;
    if let Some(path) = &settings.baseline {
        match Baseline::load(path) {
            Ok(loaded) => {
                let check = validate_metadata(loaded.metadata.as_ref(), &run_metadata);
                if !check.passed() {
                    eprint!("{}", render::metadata_mismatch_report(&check));
                    if settings.fail_on_regression {
                        return Ok(exit_code(Outcome::MetadataMismatch));
                    }
                    warn!("metadata mismatch, baseline comparison skipped");
                } else {
                    info!(
                        pps = loaded.pps,
                        mbps = loaded.mbps,
                        p95_ns = loaded.p95_ns,
                        "baseline loaded from {}",
                        path.display()
                    );
                    baseline = Some(loaded);
                }
            }
            Err(e) => {
                error!("failed to load baseline {}: {e}", path.display());
                baseline_load_failed = true;
            }
        }
    }

    let metrics = wirebench_core::metrics();
    let capture_config = CaptureConfig {
        interface: settings.interface.clone(),
        promiscuous: settings.promiscuous,
        filter: settings.filter,
        buffer_size: settings.buffer_size,
        snap_len: MAX_FRAME_SIZE,
    };
    let engine = CaptureEngine::open(&capture_config, metrics)
        .with_context(|| format!("cannot capture on {}", settings.interface))?;

    let queue = Arc::new(FrameQueue::new(settings.queue_capacity));
    let pool = WorkerPool::spawn(Arc::clone(&queue), settings.threads, metrics);

    let plan = RunPlan {
        runs: settings.runs,
        warmup_sec: settings.warmup_sec,
        duration_sec: settings.duration_sec,
        packet_limit: settings.count,
        live_stats: settings.live_stats,
    };
    let mut controller = Controller::new(
        engine,
        Arc::clone(&queue),
        metrics,
        plan,
        settings.traffic.clone(),
    );

    let run_outcome = controller.run_all();
    pool.shutdown();
    let results = run_outcome.context("capture failed during measurement")?;

    // Export the final run's full snapshot; rate fields are overridden with
    // the aggregate when this snapshot is saved as a baseline.
    let final_snapshot = metrics.snapshot();
    let mut export = MetricsReport::from_snapshot(&final_snapshot, run_metadata);
    if let Some(path) = &settings.output {
        std::fs::write(path, generate_json_report(&export)?)
            .with_context(|| format!("cannot write metrics to {}", path.display()))?;
        info!("metrics written to {}", path.display());
    }

    let agg = match aggregate(&results, settings.min_packets) {
        Ok(agg) => agg,
        Err(insufficient) => {
            eprintln!("{insufficient}");
            return Ok(exit_code(Outcome::Insufficient));
        }
    };
    println!(
        "Aggregate over {} run(s): {:.2} pps | {:.4} MB/s | p95 {}",
        agg.runs,
        agg.pps,
        agg.mbps,
        human::format_latency(agg.p95_ns as u64),
    );

    if let Some(path) = &settings.save_baseline {
        apply_aggregate(&mut export, &agg);
        std::fs::write(path, generate_json_report(&export)?)
            .with_context(|| format!("cannot write baseline to {}", path.display()))?;
        info!("baseline saved to {}", path.display());
    }

    if baseline_load_failed {
        eprintln!("baseline could not be loaded; regression comparison skipped");
        return Ok(EXIT_FAILURE);
    }

    if let Some(baseline) = baseline {
        let report = judge(&baseline, &results, &agg, settings.threshold);
        print!("{}", render::regression_report(&report));
        if report.outcome == Outcome::Regression && settings.fail_on_regression {
            return Ok(exit_code(report.outcome));
        }
    }

    Ok(exit_code(Outcome::Pass))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cli() -> Cli {
        Cli::parse_from(["wirebench"])
    }

    #[test]
    fn test_cli_defaults_resolve_to_config() {
        let config = WirebenchConfig::default();
        let settings = resolve_settings(&empty_cli(), &config).unwrap();
        assert_eq!(settings.interface, "eth0");
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.queue_capacity, 100);
        assert_eq!(settings.runs, 1);
        assert_eq!(settings.duration_sec, 10);
        assert_eq!(settings.filter, FilterKind::None);
        assert!(settings.fail_on_regression);
        assert!(settings.save_baseline.is_none());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "wirebench",
            "-i",
            "lo",
            "-t",
            "8",
            "-r",
            "5",
            "-w",
            "2",
            "-d",
            "20",
            "--filter",
            "icmp",
            "--threshold",
            "0.05",
            "--traffic",
            "icmp",
            "--traffic-target",
            "127.0.0.1",
            "--traffic-rate",
            "25",
        ]);
        let settings = resolve_settings(&cli, &WirebenchConfig::default()).unwrap();
        assert_eq!(settings.interface, "lo");
        assert_eq!(settings.threads, 8);
        assert_eq!(settings.runs, 5);
        assert_eq!(settings.warmup_sec, 2);
        assert_eq!(settings.duration_sec, 20);
        assert_eq!(settings.filter, FilterKind::Icmp);
        assert!((settings.threshold - 0.05).abs() < f64::EPSILON);
        assert_eq!(settings.traffic.mode, "icmp");
        assert_eq!(settings.traffic.target, "127.0.0.1");
        assert_eq!(settings.traffic.rate, 25);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let cli = Cli::parse_from(["wirebench", "--filter", "dns"]);
        assert!(resolve_settings(&cli, &WirebenchConfig::default()).is_err());
    }

    #[test]
    fn test_save_baseline_path_resolution() {
        // Bare flag: default path.
        let cli = Cli::parse_from(["wirebench", "--save-baseline"]);
        let settings = resolve_settings(&cli, &WirebenchConfig::default()).unwrap();
        assert_eq!(settings.save_baseline, Some(PathBuf::from("baseline.json")));

        // Explicit path wins.
        let cli = Cli::parse_from(["wirebench", "--save-baseline", "ci/base.json"]);
        let settings = resolve_settings(&cli, &WirebenchConfig::default()).unwrap();
        assert_eq!(settings.save_baseline, Some(PathBuf::from("ci/base.json")));

        // Config path used when the flag has no value.
        let mut config = WirebenchConfig::default();
        config.output.baseline_path = Some("from-config.json".to_string());
        let cli = Cli::parse_from(["wirebench", "--save-baseline"]);
        let settings = resolve_settings(&cli, &config).unwrap();
        assert_eq!(settings.save_baseline, Some(PathBuf::from("from-config.json")));
    }

    #[test]
    fn test_fail_on_regression_flag() {
        let cli = Cli::parse_from(["wirebench", "--fail-on-regression", "false"]);
        let settings = resolve_settings(&cli, &WirebenchConfig::default()).unwrap();
        assert!(!settings.fail_on_regression);
    }

    #[test]
    fn test_zero_runs_clamped() {
        let cli = Cli::parse_from(["wirebench", "-r", "0"]);
        let settings = resolve_settings(&cli, &WirebenchConfig::default()).unwrap();
        assert_eq!(settings.runs, 1);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(Outcome::Pass), EXIT_OK);
        assert_eq!(exit_code(Outcome::Regression), EXIT_REGRESSION);
        assert_eq!(exit_code(Outcome::Insufficient), EXIT_INSUFFICIENT);
        assert_eq!(exit_code(Outcome::MetadataMismatch), EXIT_CONFIG_MISMATCH);
    }

    #[test]
    fn test_saved_baseline_carries_aggregate_metrics() {
        // The final run's raw snapshot shows no drops; the aggregate does.
        let mut report = MetricsReport::default();
        report.packets.captured = 1000;
        report.packets.processed = 1000;
        report.packets.rate_pps = 120.0;
        let agg = Aggregate {
            pps: 100.0,
            mbps: 0.5,
            p95_ns: 200_000.0,
            drop_rate: 0.03,
            total_processed: 5000,
            runs: 5,
        };

        apply_aggregate(&mut report, &agg);
        let baseline = Baseline::from_report(&report).unwrap();

        assert!((baseline.pps - 100.0).abs() < 1e-9);
        assert!((baseline.mbps - 0.5).abs() < 1e-9);
        assert_eq!(baseline.p95_ns, 200_000);
        // The recomputed drop rate is the aggregate, not the final run's.
        assert!((baseline.drop_rate - 0.03).abs() < 1e-9);
    }
}
