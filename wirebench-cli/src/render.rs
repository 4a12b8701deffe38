//! Report Rendering
//!
//! Terminal tables for the regression analysis and for metadata mismatch
//! diagnostics.

use wirebench_report::human::format_latency;
use wirebench_stats::{FieldStatus, MetadataCheck, MetricVerdict, Outcome, RegressionReport};

const RULE: &str =
    "================================================================================";
const THIN_RULE: &str =
    "--------------------------------------------------------------------------------";

fn format_delta(delta_pct: f64, regressed: bool) -> String {
    let indicator = if regressed { "FAIL" } else { "OK" };
    if delta_pct.is_infinite() {
        format!("[{indicator}] N/A (baseline was 0)")
    } else {
        let sign = if delta_pct >= 0.0 { "+" } else { "" };
        format!("[{indicator}] {sign}{:.2}%", delta_pct * 100.0)
    }
}

/// Render the regression analysis report.
pub fn regression_report(report: &RegressionReport) -> String {
    let runs = report.runs.len();
    let mut out = String::new();
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
    out.push_str("                         REGRESSION ANALYSIS REPORT\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "Threshold: {:.1}%   Persistence: {} of {} run(s)\n\n",
        report.threshold * 100.0,
        report.persistence_required,
        runs,
    ));

    let section = |out: &mut String, title: &str, verdict: &MetricVerdict, render: &dyn Fn(f64) -> String| {
        out.push_str(&format!("{title}:\n"));
        out.push_str(&format!("  Baseline:  {:>16}\n", render(verdict.baseline)));
        out.push_str(&format!("  Current:   {:>16}\n", render(verdict.current)));
        out.push_str(&format!(
            "  Delta:     {}  ({} of {} run(s) regressed)\n\n",
            format_delta(verdict.delta_pct, verdict.regressed),
            verdict.failing_runs,
            runs,
        ));
    };

    section(&mut out, "THROUGHPUT (packets/sec)", &report.pps, &|v| {
        format!("{v:.2} pps")
    });
    section(&mut out, "THROUGHPUT (MB/sec)", &report.mbps, &|v| {
        format!("{v:.4} MB/s")
    });
    section(&mut out, "LATENCY (p95)", &report.latency, &|v| {
        format_latency(v as u64)
    });
    section(&mut out, "DROP RATE", &report.drops, &|v| {
        format!("{:.4}%", v * 100.0)
    });

    out.push_str(RULE);
    out.push('\n');
    match report.outcome {
        Outcome::Regression => {
            out.push_str("RESULT: PERFORMANCE REGRESSION DETECTED\n");
            out.push_str("  Regressions found in:");
            for verdict in report.verdicts() {
                if verdict.regressed {
                    out.push_str(&format!(" [{}]", verdict.name));
                }
            }
            out.push('\n');
        }
        Outcome::Pass => out.push_str("RESULT: ALL METRICS WITHIN THRESHOLD\n"),
        Outcome::Insufficient => out.push_str("RESULT: INSUFFICIENT SAMPLE\n"),
        Outcome::MetadataMismatch => out.push_str("RESULT: BASELINE METADATA MISMATCH\n"),
    }
    out.push_str(RULE);
    out.push_str("\n\n");
    out
}

/// Render the metadata mismatch table.
pub fn metadata_mismatch_report(check: &MetadataCheck) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
    out.push_str("                       BASELINE METADATA MISMATCH\n");
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!(
        "Cannot compare against baseline: {} MUST-MATCH field(s) differ.\n",
        check.hard_mismatches
    ));
    if check.warn_mismatches > 0 {
        out.push_str(&format!(
            "Additionally, {} WARN-ONLY field(s) differ (these are allowed).\n",
            check.warn_mismatches
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "{:<20} {:<25} {:<25} {}\n",
        "FIELD", "BASELINE", "CURRENT", "STATUS"
    ));
    out.push_str(THIN_RULE);
    out.push('\n');

    let display = |value: &str| {
        if value.is_empty() {
            "(not set)".to_string()
        } else {
            value.to_string()
        }
    };

    for check in check.checks.iter().filter(|c| c.must_match) {
        let status = match check.status {
            FieldStatus::Mismatch => "[MISMATCH]",
            _ => "[OK]",
        };
        out.push_str(&format!(
            "{:<20} {:<25} {:<25} {}\n",
            check.name,
            display(&check.baseline),
            display(&check.current),
            status
        ));
    }

    out.push_str(THIN_RULE);
    out.push('\n');
    out.push_str("WARN-ONLY fields (mismatches allowed):\n");
    for check in check.checks.iter().filter(|c| !c.must_match) {
        let status = match check.status {
            FieldStatus::Warn => "[WARN]",
            _ => "[OK]",
        };
        out.push_str(&format!(
            "{:<20} {:<25} {:<25} {}\n",
            check.name,
            display(&check.baseline),
            display(&check.current),
            status
        ));
    }

    out.push_str(RULE);
    out.push('\n');
    out.push_str("Ensure the baseline was generated with the same configuration as this run.\n");
    out.push_str(RULE);
    out.push_str("\n\n");
    out
}
