//! TOML configuration file parsing
//!
//! ```toml
//! [sizing]
//! policy = "adaptive"
//! block_size_large = "1M"
//! large_file_workers = 8
//!
//! [io]
//! direct = true
//!
//! [stats]
//! enabled = true
//! interval_ms = 2000
//! ```

use super::cli::Cli;
use super::{Config, OutputFormat};
use crate::plan::sizing::SizingPolicy;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the run configuration from the command line
///
/// Starts from the `--config` file when given, defaults otherwise, and applies
/// every explicit flag on top.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(cli, base)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    let sizing = &mut config.sizing;

    if cli.adaptive {
        sizing.policy = SizingPolicy::Adaptive;
    }
    if let Some(block_size) = cli.block_size {
        sizing.block_size = block_size;
    }
    if let Some(workers) = cli.workers {
        sizing.workers = to_usize(workers, "workers")?;
    }
    if let Some(size) = cli.block_size_small {
        sizing.block_size_small = size;
    }
    if let Some(size) = cli.block_size_large {
        sizing.block_size_large = size;
    }
    if let Some(threshold) = cli.small_file_threshold {
        sizing.small_file_threshold = threshold;
    }
    if let Some(workers) = cli.small_file_workers {
        sizing.small_file_workers = to_usize(workers, "small_file_workers")?;
    }
    if let Some(workers) = cli.large_file_workers {
        sizing.large_file_workers = to_usize(workers, "large_file_workers")?;
    }
    if let Some(advisor) = cli.advisor {
        sizing.advisor = advisor.into();
    }
    if let Some(sector) = cli.sector_size {
        sizing.sector_size = Some(sector);
    }

    if cli.no_direct {
        config.io.direct = false;
    }
    if cli.no_drop_cache {
        config.io.drop_cache = false;
    }

    if cli.stats {
        config.stats.enabled = true;
    }
    if let Some(interval) = cli.stats_interval {
        config.stats.interval_ms = u64::try_from(interval.as_millis())
            .with_context(|| format!("stats interval out of range: {:?}", interval))?;
    }

    if cli.json {
        config.output.format = OutputFormat::Json;
    }
    if cli.quiet {
        config.output.quiet = true;
    }

    Ok(config)
}

fn to_usize(value: u64, name: &str) -> Result<usize> {
    usize::try_from(value).with_context(|| format!("{} out of range: {}", name, value))
}
