//! blockwarm CLI entry point

use anyhow::{Context, Result};
use blockwarm::config::cli::{Cli, LogLevel};
use blockwarm::config::toml::load_config;
use blockwarm::config::{Config, OutputFormat};
use blockwarm::output::json::write_json;
use blockwarm::output::text::{print_report, summary_line, ConsoleSink};
use blockwarm::output::{EventSink, TracingSink};
use blockwarm::Warmup;
use clap::CommandFactory;
use std::sync::Arc;
use tracing_subscriber::fmt;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Diagnostics go to stderr so stdout carries only the report
    init_logging(cli.log_level)?;

    let paths = cli.target_paths();
    if paths.is_empty() {
        println!("Please provide file paths");
        Cli::command().print_help().context("Failed to print usage")?;
        return Ok(());
    }

    let config = load_config(&cli)?;
    let sink = event_sink(&config);

    let report = Warmup::new(config.clone())
        .with_sink(sink)
        .run(&paths)
        .context("Warmup failed")?;

    match (config.output.format, config.output.quiet) {
        (OutputFormat::Json, quiet) => write_json(std::io::stdout().lock(), &report, !quiet)?,
        (OutputFormat::Text, true) => println!("{}", summary_line(&report)),
        (OutputFormat::Text, false) => print_report(&report),
    }

    Ok(())
}

/// Live samples are printed only for the full text report
fn event_sink(config: &Config) -> Arc<dyn EventSink> {
    if config.output.format == OutputFormat::Text && !config.output.quiet {
        Arc::new(ConsoleSink)
    } else {
        Arc::new(TracingSink)
    }
}

fn init_logging(level: LogLevel) -> Result<()> {
    let level: tracing::Level = level.into();

    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
