//! JSON output formatting
//!
//! The report is serialized as-is with `serde_json`; durations appear as
//! fractional seconds and the start time as RFC 3339.

use super::WarmupReport;
use crate::Result;
use anyhow::Context;
use std::io::Write;

/// Serialize the report to a JSON string
pub fn to_json(report: &WarmupReport, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    json.context("Failed to serialize warmup report")
}

/// Write the report as JSON followed by a newline
pub fn write_json<W: Write>(mut writer: W, report: &WarmupReport, pretty: bool) -> Result<()> {
    let json = to_json(report, pretty)?;
    writeln!(writer, "{}", json).context("Failed to write JSON report")?;
    Ok(())
}
