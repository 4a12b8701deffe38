//! Regression Judgement
//!
//! Compares the current runs against a stored baseline. Throughput
//! regresses below `baseline * (1 - threshold)`; latency and drop rate
//! regress above `baseline * (1 + threshold)` (a zero-drop baseline
//! regresses once the current drop rate exceeds the threshold itself).
//!
//! A metric only fails the gate when it regresses persistently — in at
//! least `ceil(0.6 * runs)` runs — so one noisy run cannot trip CI.
//! The judge never errors; it returns a structured report and outcome.

use tracing::warn;
use wirebench_report::{Baseline, RunMetadata};

use crate::aggregate::{median, Aggregate, RunResult};

/// Default regression threshold (10%).
pub const DEFAULT_THRESHOLD: f64 = 0.10;

/// Fraction of runs that must regress for a metric to fail the gate.
pub const PERSISTENCE_FRACTION: f64 = 0.6;

/// Final outcome of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No persistent regression.
    Pass,
    /// At least one metric regressed persistently.
    Regression,
    /// Too few packets were processed to judge.
    Insufficient,
    /// A must-match metadata field differs from the baseline.
    MetadataMismatch,
}

/// One metric compared against the baseline for a single run.
#[derive(Debug, Clone, Copy)]
pub struct MetricDelta {
    /// Baseline value.
    pub baseline: f64,
    /// Value observed this run.
    pub current: f64,
    /// Relative change; infinite when the baseline was zero and the
    /// current value is not.
    pub delta_pct: f64,
    /// Whether this run regressed on this metric.
    pub regressed: bool,
}

/// All four gated metrics for one run.
#[derive(Debug, Clone)]
pub struct RunComparison {
    /// 1-based run index.
    pub run: usize,
    /// Packets-per-second comparison.
    pub pps: MetricDelta,
    /// Megabytes-per-second comparison.
    pub mbps: MetricDelta,
    /// p95 latency comparison.
    pub latency: MetricDelta,
    /// Drop-rate comparison.
    pub drops: MetricDelta,
}

impl RunComparison {
    /// Whether any metric regressed in this run.
    pub fn any_regression(&self) -> bool {
        self.pps.regressed || self.mbps.regressed || self.latency.regressed || self.drops.regressed
    }
}

/// Gate decision for one metric across all runs.
#[derive(Debug, Clone)]
pub struct MetricVerdict {
    /// Metric name for reporting.
    pub name: &'static str,
    /// Baseline value.
    pub baseline: f64,
    /// Aggregate (median) current value.
    pub current: f64,
    /// Relative change of the aggregate against the baseline.
    pub delta_pct: f64,
    /// Number of runs in which this metric regressed.
    pub failing_runs: usize,
    /// Whether the failures reached the persistence threshold.
    pub regressed: bool,
}

/// Full judgement across runs.
#[derive(Debug, Clone)]
pub struct RegressionReport {
    /// Threshold the comparison ran with.
    pub threshold: f64,
    /// Runs required to regress before a metric fails the gate.
    pub persistence_required: usize,
    /// Per-run comparisons.
    pub runs: Vec<RunComparison>,
    /// Throughput (pps) verdict.
    pub pps: MetricVerdict,
    /// Throughput (mbps) verdict.
    pub mbps: MetricVerdict,
    /// Latency (p95) verdict.
    pub latency: MetricVerdict,
    /// Drop-rate verdict.
    pub drops: MetricVerdict,
    /// Overall outcome: `Regression` or `Pass`.
    pub outcome: Outcome,
}

impl RegressionReport {
    /// Verdicts in reporting order.
    pub fn verdicts(&self) -> [&MetricVerdict; 4] {
        [&self.pps, &self.mbps, &self.latency, &self.drops]
    }
}

/// Runs that must regress for persistence: `ceil(0.6 * runs)`, at least 1.
pub fn persistence_threshold(runs: usize) -> usize {
    ((PERSISTENCE_FRACTION * runs as f64).ceil() as usize).max(1)
}

fn lower_bound_delta(baseline: f64, current: f64, threshold: f64) -> MetricDelta {
    let (delta_pct, regressed) = if baseline > 0.0 {
        (
            (current - baseline) / baseline,
            current < baseline * (1.0 - threshold),
        )
    } else {
        (0.0, false)
    };
    MetricDelta {
        baseline,
        current,
        delta_pct,
        regressed,
    }
}

fn upper_bound_delta(baseline: f64, current: f64, threshold: f64) -> MetricDelta {
    let (delta_pct, regressed) = if baseline > 0.0 {
        (
            (current - baseline) / baseline,
            current > baseline * (1.0 + threshold),
        )
    } else {
        (0.0, false)
    };
    MetricDelta {
        baseline,
        current,
        delta_pct,
        regressed,
    }
}

fn drop_rate_delta(baseline: f64, current: f64, threshold: f64) -> MetricDelta {
    if baseline > 0.0 {
        upper_bound_delta(baseline, current, threshold)
    } else {
        // Zero-drop baseline: any drop rate above the threshold regresses.
        MetricDelta {
            baseline,
            current,
            delta_pct: if current > 0.0 { f64::INFINITY } else { 0.0 },
            regressed: current > threshold,
        }
    }
}

/// Compare one run against the baseline.
pub fn compare_run(baseline: &Baseline, result: &RunResult, threshold: f64) -> RunComparison {
    RunComparison {
        run: result.run,
        pps: lower_bound_delta(baseline.pps, result.pps, threshold),
        mbps: lower_bound_delta(baseline.mbps, result.mbps, threshold),
        latency: upper_bound_delta(baseline.p95_ns as f64, result.p95_ns as f64, threshold),
        drops: drop_rate_delta(baseline.drop_rate, result.drop_rate, threshold),
    }
}

/// Judge all runs against the baseline with K-of-N persistence.
pub fn judge(
    baseline: &Baseline,
    results: &[RunResult],
    aggregate: &Aggregate,
    threshold: f64,
) -> RegressionReport {
    let persistence_required = persistence_threshold(results.len());
    let runs: Vec<RunComparison> = results
        .iter()
        .map(|result| compare_run(baseline, result, threshold))
        .collect();

    let drop_median = median(&results.iter().map(|r| r.drop_rate).collect::<Vec<_>>());

    let verdict = |name: &'static str,
                   base: f64,
                   current: f64,
                   failing_runs: usize,
                   zero_base_infinite: bool| {
        let delta_pct = if base > 0.0 {
            (current - base) / base
        } else if zero_base_infinite && current > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        MetricVerdict {
            name,
            baseline: base,
            current,
            delta_pct,
            failing_runs,
            regressed: failing_runs >= persistence_required,
        }
    };

    let pps = verdict(
        "throughput-pps",
        baseline.pps,
        aggregate.pps,
        runs.iter().filter(|c| c.pps.regressed).count(),
        false,
    );
    let mbps = verdict(
        "throughput-mbps",
        baseline.mbps,
        aggregate.mbps,
        runs.iter().filter(|c| c.mbps.regressed).count(),
        false,
    );
    let latency = verdict(
        "latency-p95",
        baseline.p95_ns as f64,
        aggregate.p95_ns,
        runs.iter().filter(|c| c.latency.regressed).count(),
        false,
    );
    let drops = verdict(
        "drop-rate",
        baseline.drop_rate,
        drop_median,
        runs.iter().filter(|c| c.drops.regressed).count(),
        true,
    );

    let outcome = if pps.regressed || mbps.regressed || latency.regressed || drops.regressed {
        Outcome::Regression
    } else {
        Outcome::Pass
    };

    RegressionReport {
        threshold,
        persistence_required,
        runs,
        pps,
        mbps,
        latency,
        drops,
        outcome,
    }
}

// ─── Metadata compatibility ──────────────────────────────────────────────────

/// Comparison status of one metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    /// Equal, or not set in the baseline.
    Match,
    /// Must-match field differs: comparison is meaningless.
    Mismatch,
    /// Warn-only field differs: logged, comparison continues.
    Warn,
}

/// One metadata field compared between baseline and current run.
#[derive(Debug, Clone)]
pub struct FieldCheck {
    /// Field name as it appears in the schema.
    pub name: &'static str,
    /// Whether a mismatch is fatal.
    pub must_match: bool,
    /// Baseline value rendered for display (empty when unset).
    pub baseline: String,
    /// Current value rendered for display.
    pub current: String,
    /// Comparison result.
    pub status: FieldStatus,
}

/// Result of the metadata compatibility check.
#[derive(Debug, Clone)]
pub struct MetadataCheck {
    /// Per-field results, must-match fields first.
    pub checks: Vec<FieldCheck>,
    /// Number of fatal mismatches.
    pub hard_mismatches: usize,
    /// Number of warn-only mismatches.
    pub warn_mismatches: usize,
    /// Whether the baseline carried a metadata block at all.
    pub baseline_present: bool,
}

impl MetadataCheck {
    /// Whether the comparison may proceed.
    pub fn passed(&self) -> bool {
        self.hard_mismatches == 0
    }
}

fn string_field(
    name: &'static str,
    must_match: bool,
    baseline: &str,
    current: &str,
) -> FieldCheck {
    let differs = !baseline.is_empty() && baseline != current;
    field_check(name, must_match, baseline.to_string(), current.to_string(), differs)
}

fn numeric_field(name: &'static str, must_match: bool, baseline: u32, current: u32) -> FieldCheck {
    let differs = baseline > 0 && baseline != current;
    let render = |v: u32| if v > 0 { v.to_string() } else { String::new() };
    field_check(name, must_match, render(baseline), current.to_string(), differs)
}

fn field_check(
    name: &'static str,
    must_match: bool,
    baseline: String,
    current: String,
    differs: bool,
) -> FieldCheck {
    let status = match (differs, must_match) {
        (false, _) => FieldStatus::Match,
        (true, true) => FieldStatus::Mismatch,
        (true, false) => FieldStatus::Warn,
    };
    FieldCheck {
        name,
        must_match,
        baseline,
        current,
        status,
    }
}

/// Validate baseline metadata against the current run configuration.
///
/// A baseline without a metadata block passes with a warning. A field set
/// in the baseline and differing from the current value is fatal for
/// must-match fields and logged for warn-only fields.
pub fn validate_metadata(baseline: Option<&RunMetadata>, current: &RunMetadata) -> MetadataCheck {
    let Some(base) = baseline else {
        warn!("baseline has no metadata block, skipping compatibility check");
        return MetadataCheck {
            checks: Vec::new(),
            hard_mismatches: 0,
            warn_mismatches: 0,
            baseline_present: false,
        };
    };

    let checks = vec![
        // Must-match: a difference makes the comparison meaningless.
        string_field("filter", true, &base.filter, &current.filter),
        numeric_field("threads", true, base.threads, current.threads),
        numeric_field("warmup_sec", true, base.warmup_sec, current.warmup_sec),
        numeric_field("duration_sec", true, base.duration_sec, current.duration_sec),
        string_field("traffic_mode", true, &base.traffic_mode, &current.traffic_mode),
        string_field("traffic_target", true, &base.traffic_target, &current.traffic_target),
        numeric_field("traffic_rate", true, base.traffic_rate, current.traffic_rate),
        // Warn-only: environment differences that keep the comparison usable.
        string_field("interface", false, &base.interface, &current.interface),
        string_field("os", false, &base.os, &current.os),
        numeric_field(
            "bpf_buffer_size",
            false,
            base.bpf_buffer_size,
            current.bpf_buffer_size,
        ),
        string_field("git_sha", false, &base.git_sha, &current.git_sha),
    ];

    let hard_mismatches = checks
        .iter()
        .filter(|c| c.status == FieldStatus::Mismatch)
        .count();
    let warn_mismatches = checks
        .iter()
        .filter(|c| c.status == FieldStatus::Warn)
        .count();

    for check in checks.iter().filter(|c| c.status == FieldStatus::Warn) {
        warn!(
            field = check.name,
            baseline = %check.baseline,
            current = %check.current,
            "metadata differs (allowed)"
        );
    }

    MetadataCheck {
        checks,
        hard_mismatches,
        warn_mismatches,
        baseline_present: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;

    fn baseline() -> Baseline {
        Baseline {
            pps: 100.0,
            mbps: 0.5,
            p95_ns: 200_000,
            drop_rate: 0.0,
            pkts_processed: 1000,
            metadata: None,
        }
    }

    fn run_with_pps(run: usize, pps: f64) -> RunResult {
        RunResult {
            run,
            pps,
            mbps: 0.5,
            p95_ns: 200_000,
            processed: 1000,
            captured: 1000,
            drop_rate: 0.0,
            elapsed_sec: 10.0,
        }
    }

    fn judge_pps(pps_per_run: &[f64]) -> RegressionReport {
        let results: Vec<RunResult> = pps_per_run
            .iter()
            .enumerate()
            .map(|(i, &pps)| run_with_pps(i + 1, pps))
            .collect();
        let agg = aggregate(&results, 0).unwrap();
        judge(&baseline(), &results, &agg, DEFAULT_THRESHOLD)
    }

    #[test]
    fn test_persistence_threshold_values() {
        assert_eq!(persistence_threshold(1), 1);
        assert_eq!(persistence_threshold(2), 2);
        assert_eq!(persistence_threshold(3), 2);
        assert_eq!(persistence_threshold(4), 3);
        assert_eq!(persistence_threshold(5), 3);
        assert_eq!(persistence_threshold(10), 6);
        assert_eq!(persistence_threshold(0), 1);
    }

    #[test]
    fn test_clean_pass() {
        // Median 100, zero delta: everything within threshold.
        let report = judge_pps(&[99.0, 101.0, 100.0, 98.0, 102.0]);
        assert_eq!(report.outcome, Outcome::Pass);
        assert_eq!(report.pps.failing_runs, 0);
        assert!((report.pps.current - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_run_not_persistent() {
        // One bad run out of five; persistence needs 3.
        let report = judge_pps(&[50.0, 100.0, 101.0, 100.0, 102.0]);
        assert_eq!(report.outcome, Outcome::Pass);
        assert_eq!(report.pps.failing_runs, 1);
        assert_eq!(report.persistence_required, 3);
        assert!(!report.pps.regressed);
        assert!(report.runs[0].pps.regressed);
    }

    #[test]
    fn test_persistent_regression() {
        // Three of five runs below 90: gate trips.
        let report = judge_pps(&[70.0, 72.0, 75.0, 100.0, 101.0]);
        assert_eq!(report.outcome, Outcome::Regression);
        assert_eq!(report.pps.failing_runs, 3);
        assert!(report.pps.regressed);
    }

    #[test]
    fn test_boundary_is_not_regression() {
        // Exactly baseline * (1 - threshold) does not regress (strict less-than).
        let report = judge_pps(&[90.0, 90.0, 90.0, 90.0, 90.0]);
        assert_eq!(report.outcome, Outcome::Pass);
        assert_eq!(report.pps.failing_runs, 0);
    }

    #[test]
    fn test_single_run_judged_alone() {
        let report = judge_pps(&[80.0]);
        assert_eq!(report.persistence_required, 1);
        assert_eq!(report.outcome, Outcome::Regression);
    }

    #[test]
    fn test_latency_regression_upper_bound() {
        let mut results = vec![run_with_pps(1, 100.0), run_with_pps(2, 100.0)];
        results[0].p95_ns = 250_000; // +25% over 200µs
        results[1].p95_ns = 260_000;
        let agg = aggregate(&results, 0).unwrap();
        let report = judge(&baseline(), &results, &agg, DEFAULT_THRESHOLD);
        assert!(report.latency.regressed);
        assert_eq!(report.outcome, Outcome::Regression);
    }

    #[test]
    fn test_drop_rate_zero_baseline_rule() {
        let mut results = vec![run_with_pps(1, 100.0)];
        results[0].drop_rate = 0.15; // above the 10% threshold itself
        let agg = aggregate(&results, 0).unwrap();
        let report = judge(&baseline(), &results, &agg, DEFAULT_THRESHOLD);
        assert!(report.drops.regressed);
        assert!(report.drops.delta_pct.is_infinite());

        // Below the threshold: tolerated.
        results[0].drop_rate = 0.05;
        let agg = aggregate(&results, 0).unwrap();
        let report = judge(&baseline(), &results, &agg, DEFAULT_THRESHOLD);
        assert!(!report.drops.regressed);
    }

    #[test]
    fn test_drop_rate_nonzero_baseline_rule() {
        let mut base = baseline();
        base.drop_rate = 0.10;
        let mut results = vec![run_with_pps(1, 100.0)];
        results[0].drop_rate = 0.12; // +20% over baseline
        let agg = aggregate(&results, 0).unwrap();
        let report = judge(&base, &results, &agg, DEFAULT_THRESHOLD);
        assert!(report.drops.regressed);

        results[0].drop_rate = 0.105; // +5%, within threshold
        let agg = aggregate(&results, 0).unwrap();
        let report = judge(&base, &results, &agg, DEFAULT_THRESHOLD);
        assert!(!report.drops.regressed);
    }

    #[test]
    fn test_zero_baseline_metric_never_regresses() {
        let mut base = baseline();
        base.mbps = 0.0;
        let results = vec![run_with_pps(1, 100.0)];
        let agg = aggregate(&results, 0).unwrap();
        let report = judge(&base, &results, &agg, DEFAULT_THRESHOLD);
        assert!(!report.mbps.regressed);
    }

    // ─── Metadata validation ─────────────────────────────────────────────

    fn reference_metadata() -> RunMetadata {
        RunMetadata {
            interface: "en0".to_string(),
            filter: "icmp".to_string(),
            threads: 4,
            bpf_buffer_size: 131_072,
            duration_sec: 20,
            warmup_sec: 2,
            traffic_mode: "icmp".to_string(),
            traffic_target: "8.8.8.8".to_string(),
            traffic_rate: 50,
            os: "macos".to_string(),
            git_sha: "abc1234".to_string(),
        }
    }

    #[test]
    fn test_matching_metadata_passes() {
        let meta = reference_metadata();
        let check = validate_metadata(Some(&meta), &meta);
        assert!(check.passed());
        assert_eq!(check.hard_mismatches, 0);
        assert_eq!(check.warn_mismatches, 0);
        assert!(check.baseline_present);
    }

    #[test]
    fn test_missing_metadata_block_passes() {
        let check = validate_metadata(None, &reference_metadata());
        assert!(check.passed());
        assert!(!check.baseline_present);
    }

    #[test]
    fn test_filter_mismatch_is_fatal() {
        let mut base = reference_metadata();
        base.filter = "none".to_string();
        let check = validate_metadata(Some(&base), &reference_metadata());
        assert!(!check.passed());
        assert_eq!(check.hard_mismatches, 1);
        let field = check.checks.iter().find(|c| c.name == "filter").unwrap();
        assert_eq!(field.status, FieldStatus::Mismatch);
    }

    #[test]
    fn test_every_must_match_field_is_fatal() {
        let current = reference_metadata();
        let mutations: Vec<(&str, Box<dyn Fn(&mut RunMetadata)>)> = vec![
            ("filter", Box::new(|m| m.filter = "none".into())),
            ("threads", Box::new(|m| m.threads = 8)),
            ("warmup_sec", Box::new(|m| m.warmup_sec = 5)),
            ("duration_sec", Box::new(|m| m.duration_sec = 60)),
            ("traffic_mode", Box::new(|m| m.traffic_mode = "none".into())),
            ("traffic_target", Box::new(|m| m.traffic_target = "1.1.1.1".into())),
            ("traffic_rate", Box::new(|m| m.traffic_rate = 100)),
        ];
        for (name, mutate) in mutations {
            let mut base = reference_metadata();
            mutate(&mut base);
            let check = validate_metadata(Some(&base), &current);
            assert!(!check.passed(), "{name} mismatch must be fatal");
        }
    }

    #[test]
    fn test_warn_only_fields_do_not_fail() {
        let mut base = reference_metadata();
        base.interface = "eth0".to_string();
        base.os = "linux".to_string();
        base.bpf_buffer_size = 65_536;
        base.git_sha = "fff9999".to_string();
        let check = validate_metadata(Some(&base), &reference_metadata());
        assert!(check.passed());
        assert_eq!(check.warn_mismatches, 4);
    }

    #[test]
    fn test_unset_baseline_fields_do_not_trigger() {
        let mut base = reference_metadata();
        base.filter = String::new();
        base.threads = 0;
        base.traffic_rate = 0;
        let check = validate_metadata(Some(&base), &reference_metadata());
        assert!(check.passed());
    }

    #[test]
    fn test_check_report_enumerates_all_fields() {
        let mut base = reference_metadata();
        base.traffic_rate = 100;
        let check = validate_metadata(Some(&base), &reference_metadata());
        assert_eq!(check.checks.len(), 11);
        assert_eq!(check.checks.iter().filter(|c| c.must_match).count(), 7);
        let rate = check.checks.iter().find(|c| c.name == "traffic_rate").unwrap();
        assert_eq!(rate.status, FieldStatus::Mismatch);
        let os = check.checks.iter().find(|c| c.name == "os").unwrap();
        assert_eq!(os.status, FieldStatus::Match);
    }
}
