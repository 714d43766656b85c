//! CLI argument parsing using clap

use super::{parse_duration, parse_size};
use crate::plan::advisor::AdvisorKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Device query used to find the physical sector size
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdvisorArg {
    /// ioctl on block devices, sysfs queue attributes otherwise
    Sysfs,
    /// `df` + `lsblk`
    Lsblk,
}

impl From<AdvisorArg> for AdvisorKind {
    fn from(arg: AdvisorArg) -> Self {
        match arg {
            AdvisorArg::Sysfs => AdvisorKind::Sysfs,
            AdvisorArg::Lsblk => AdvisorKind::Lsblk,
        }
    }
}

/// Log level argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// blockwarm - pre-warm files on block storage without filling the page cache
#[derive(Parser, Debug)]
#[command(name = "blockwarm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Files or block devices to warm; each argument may be a comma-separated list
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long, env = "BLOCKWARM_CONFIG")]
    pub config: Option<PathBuf>,

    // === Sizing ===
    /// Block size for fixed sizing (e.g., 256k, 1M)
    #[arg(short = 'b', long, value_parser = size_arg)]
    pub block_size: Option<u64>,

    /// Number of read workers for fixed sizing
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Derive block size and workers from the device's physical sector size
    #[arg(long)]
    pub adaptive: bool,

    /// Adaptive block size for small files
    #[arg(long, value_parser = size_arg)]
    pub block_size_small: Option<u64>,

    /// Adaptive block size for large files
    #[arg(long, value_parser = size_arg)]
    pub block_size_large: Option<u64>,

    /// Files below this size are small (e.g., 2M)
    #[arg(long, value_parser = size_arg)]
    pub small_file_threshold: Option<u64>,

    /// Workers used when all files are small
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub small_file_workers: Option<u64>,

    /// Workers used when any file is large
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub large_file_workers: Option<u64>,

    /// How to query the physical sector size
    #[arg(long, value_enum)]
    pub advisor: Option<AdvisorArg>,

    /// Use this physical sector size instead of querying the device
    #[arg(long, value_parser = size_arg)]
    pub sector_size: Option<u64>,

    // === Cache avoidance ===
    /// Read through the page cache instead of using O_DIRECT
    #[arg(long)]
    pub no_direct: bool,

    /// Skip the posix_fadvise(DONTNEED) passes
    #[arg(long)]
    pub no_drop_cache: bool,

    // === Reporting ===
    /// Print periodic throughput samples
    #[arg(long)]
    pub stats: bool,

    /// Sampling interval (e.g., 5s, 500ms)
    #[arg(long, value_parser = duration_arg)]
    pub stats_interval: Option<Duration>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print only a one-line summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log level for diagnostics on stderr
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Target paths with comma-separated lists expanded
    pub fn target_paths(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .flat_map(|arg| arg.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect()
    }
}

fn size_arg(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| format!("{:#}", e))
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| format!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("blockwarm").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_no_arguments() {
        let cli = parse(&[]);
        assert!(cli.paths.is_empty());
        assert!(cli.target_paths().is_empty());
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.adaptive);
    }

    #[test]
    fn test_comma_separated_paths() {
        let cli = parse(&["/data/a.bin,/data/b.bin", "/data/c.bin", "/data/d.bin,"]);
        assert_eq!(
            cli.target_paths(),
            vec![
                PathBuf::from("/data/a.bin"),
                PathBuf::from("/data/b.bin"),
                PathBuf::from("/data/c.bin"),
                PathBuf::from("/data/d.bin"),
            ]
        );
    }

    #[test]
    fn test_size_and_duration_flags() {
        let cli = parse(&[
            "--block-size",
            "1M",
            "--workers",
            "2",
            "--stats",
            "--stats-interval",
            "500ms",
            "--sector-size",
            "4k",
            "f",
        ]);
        assert_eq!(cli.block_size, Some(1024 * 1024));
        assert_eq!(cli.workers, Some(2));
        assert!(cli.stats);
        assert_eq!(cli.stats_interval, Some(Duration::from_millis(500)));
        assert_eq!(cli.sector_size, Some(4096));
    }

    #[test]
    fn test_adaptive_flags() {
        let cli = parse(&[
            "--adaptive",
            "--advisor",
            "lsblk",
            "--block-size-small",
            "64k",
            "--large-file-workers",
            "16",
            "f",
        ]);
        assert!(cli.adaptive);
        assert_eq!(cli.advisor, Some(AdvisorArg::Lsblk));
        assert_eq!(AdvisorKind::from(AdvisorArg::Lsblk), AdvisorKind::Lsblk);
        assert_eq!(cli.block_size_small, Some(64 * 1024));
        assert_eq!(cli.large_file_workers, Some(16));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad = |args: &[&str]| Cli::try_parse_from(std::iter::once("blockwarm").chain(args.iter().copied()));
        assert!(bad(&["--workers", "0", "f"]).is_err());
        assert!(bad(&["--block-size", "lots", "f"]).is_err());
        assert!(bad(&["--advisor", "udev", "f"]).is_err());
        assert!(bad(&["--stats-interval", "soon", "f"]).is_err());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }
}
