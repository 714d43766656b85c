//! Human-readable text output

use super::{EventSink, TracingSink, WarmupEvent, WarmupReport};
use crate::util::time::{bytes_to_mb, format_duration, format_throughput, MB};
use std::fmt;
use std::time::Duration;

/// Text rendering of a report
///
/// The summary block at the end keeps the classic layout:
///
/// ```text
/// ~~~ Overall Stats ~~~
/// Total time: 1.23 seconds
/// Total data: 10.00 MB
/// Average throughput: 8.13 MB/s
/// ```
pub struct TextReport<'a>(pub &'a WarmupReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;

        if let Some(plan) = &report.plan {
            writeln!(f, "Plan:")?;
            writeln!(
                f,
                "  Policy:     {}{}",
                plan.policy,
                if plan.small_files { " (small files)" } else { "" }
            )?;
            writeln!(f, "  Block size: {}", format_bytes(plan.block_size))?;
            writeln!(f, "  Workers:    {}", plan.workers)?;
            writeln!(f, "  Alignment:  {} B", plan.alignment)?;
            if let Some(sector) = plan.sector_size {
                writeln!(f, "  Sector:     {} B", sector)?;
            }
        }

        if !report.files.is_empty() {
            writeln!(f, "Files:")?;
            for file in &report.files {
                writeln!(
                    f,
                    "  {} ({}, {} blocks)",
                    file.path.display(),
                    format_bytes(file.size),
                    file.blocks
                )?;
            }
        }

        writeln!(
            f,
            "Blocks: {} planned, {} completed, {} failed",
            report.blocks_planned, report.blocks_completed, report.blocks_failed
        )?;

        if !report.samples.is_empty() {
            writeln!(f, "Samples:")?;
            for sample in &report.samples {
                writeln!(f, "  {}", sample)?;
            }
        }

        write!(f, "{}", OverallStats(report))
    }
}

/// The "Overall Stats" block alone
pub struct OverallStats<'a>(pub &'a WarmupReport);

impl fmt::Display for OverallStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "\n~~~ Overall Stats ~~~ ")?;
        writeln!(f, "Total time: {:.2} seconds", report.elapsed_secs)?;
        writeln!(f, "Total data: {:.2} MB", bytes_to_mb(report.bytes_read))?;
        writeln!(f, "Average throughput: {:.2} MB/s", report.throughput_mbps)
    }
}

/// Render the full report
pub fn render_report(report: &WarmupReport) -> String {
    TextReport(report).to_string()
}

/// Render the "Overall Stats" block
pub fn render_overall_stats(report: &WarmupReport) -> String {
    OverallStats(report).to_string()
}

/// Print the report to stdout
pub fn print_report(report: &WarmupReport) {
    print!("{}", TextReport(report));
}

/// One-line completion summary for quiet mode
pub fn summary_line(report: &WarmupReport) -> String {
    let elapsed = Duration::try_from_secs_f64(report.elapsed_secs).unwrap_or_default();
    format!(
        "warmed {}/{} blocks ({:.2} MB) in {}, {}",
        report.blocks_completed,
        report.blocks_planned,
        report.data_mb(),
        format_duration(elapsed),
        format_throughput(report.throughput_mbps * MB)
    )
}

/// Prints throughput samples to stdout as they arrive; everything else goes to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: WarmupEvent) {
        match event {
            WarmupEvent::Sample(sample) => println!("{}", sample),
            other => TracingSink.emit(other),
        }
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
