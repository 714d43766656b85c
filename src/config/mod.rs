//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! Precedence: built-in defaults, then the TOML file (if any), then CLI flags.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::plan::advisor::AdvisorKind;
use crate::plan::sizing::SizingPolicy;
use crate::target::OpenMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Complete warmup configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub io: OpenMode,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Block size and concurrency settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Fixed or adaptive sizing
    #[serde(default)]
    pub policy: SizingPolicy,
    /// Block size for fixed sizing
    #[serde(default = "default_block_size", deserialize_with = "size::deserialize")]
    pub block_size: u64,
    /// Worker count for fixed sizing
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Adaptive block size for small runs (rounded up to the sector size)
    #[serde(default = "default_block_size_small", deserialize_with = "size::deserialize")]
    pub block_size_small: u64,
    /// Adaptive block size for large runs (rounded up to the sector size)
    #[serde(default = "default_block_size_large", deserialize_with = "size::deserialize")]
    pub block_size_large: u64,
    /// Files below this size count as small
    #[serde(default = "default_small_file_threshold", deserialize_with = "size::deserialize")]
    pub small_file_threshold: u64,
    #[serde(default = "default_small_file_workers")]
    pub small_file_workers: usize,
    #[serde(default = "default_large_file_workers")]
    pub large_file_workers: usize,
    /// Device query used for adaptive sizing
    #[serde(default)]
    pub advisor: AdvisorKind,
    /// Physical sector size override; skips the device query
    #[serde(default)]
    pub sector_size: Option<u64>,
}

fn default_block_size() -> u64 {
    256 * KIB
}

fn default_workers() -> usize {
    4
}

fn default_block_size_small() -> u64 {
    256 * KIB
}

fn default_block_size_large() -> u64 {
    MIB
}

fn default_small_file_threshold() -> u64 {
    2 * MIB
}

fn default_small_file_workers() -> usize {
    1
}

fn default_large_file_workers() -> usize {
    8
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            policy: SizingPolicy::default(),
            block_size: default_block_size(),
            workers: default_workers(),
            block_size_small: default_block_size_small(),
            block_size_large: default_block_size_large(),
            small_file_threshold: default_small_file_threshold(),
            small_file_workers: default_small_file_workers(),
            large_file_workers: default_large_file_workers(),
            advisor: AdvisorKind::default(),
            sector_size: None,
        }
    }
}

/// Periodic throughput reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Run the throughput monitor
    #[serde(default)]
    pub enabled: bool,
    /// Sampling interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    5000
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_interval_ms(),
        }
    }
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Completion report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Report settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Print only a one-line summary
    #[serde(default)]
    pub quiet: bool,
}

/// Parse a size string with an optional binary suffix (`4k`, `256K`, `1M`, `2G`, `1T`)
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    if s.is_empty() {
        anyhow::bail!("Empty size string");
    }

    let s = s.strip_suffix("IB").or_else(|| s.strip_suffix('B')).unwrap_or(&s);

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('K') {
        (n, KIB)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, MIB)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * MIB)
    } else if let Some(n) = s.strip_suffix('T') {
        (n, 1024 * 1024 * MIB)
    } else {
        (s, 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in size: {}", num_str))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Size too large: {}", s))
}

/// Parse a duration string (`500ms`, `5s`, `2m`); a bare number is seconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (num_str, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else {
        (s.as_str(), 1000)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid number in duration: {}", num_str))?;

    let millis = num
        .checked_mul(unit_ms)
        .with_context(|| format!("Duration too large: {}", s))?;

    Ok(Duration::from_millis(millis))
}

/// Sizes in TOML may be integers or suffixed strings
mod size {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Size::deserialize(deserializer)? {
            Size::Bytes(n) => Ok(n),
            Size::Text(s) => super::parse_size(&s).map_err(|e| de::Error::custom(format!("{:#}", e))),
        }
    }
}
