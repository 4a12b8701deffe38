//! JSON Output

use crate::report::MetricsReport;

/// Serialize a metrics report as prettified JSON.
pub fn generate_json_report(report: &MetricsReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
