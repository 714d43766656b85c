//! Configuration validation

use super::*;
use crate::plan::sizing::MIN_ALIGNMENT;
use anyhow::Result;

/// Upper bound on any block size; a buffer this large per worker is already absurd
const MAX_BLOCK_SIZE: u64 = 1024 * 1024 * 1024;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_sizing(&config.sizing, config.io.direct)?;
    validate_stats(&config.stats)?;
    Ok(())
}

/// Validate sizing configuration
pub fn validate_sizing(sizing: &SizingConfig, direct: bool) -> Result<()> {
    validate_block_size("block_size", sizing.block_size)?;
    validate_block_size("block_size_small", sizing.block_size_small)?;
    validate_block_size("block_size_large", sizing.block_size_large)?;

    if sizing.policy == SizingPolicy::Fixed && direct && sizing.block_size % MIN_ALIGNMENT != 0 {
        anyhow::bail!(
            "block_size must be a multiple of {} with direct IO, got {}",
            MIN_ALIGNMENT,
            sizing.block_size
        );
    }

    if sizing.workers == 0 {
        anyhow::bail!("workers must be at least 1");
    }
    if sizing.small_file_workers == 0 {
        anyhow::bail!("small_file_workers must be at least 1");
    }
    if sizing.large_file_workers == 0 {
        anyhow::bail!("large_file_workers must be at least 1");
    }

    if let Some(sector) = sizing.sector_size {
        if sector == 0 || !sector.is_power_of_two() {
            anyhow::bail!("sector_size must be a power of two, got {}", sector);
        }
    }

    Ok(())
}

fn validate_block_size(name: &str, size: u64) -> Result<()> {
    if size == 0 {
        anyhow::bail!("{} must be greater than 0", name);
    }
    if size > MAX_BLOCK_SIZE {
        anyhow::bail!("{} must be at most {} bytes, got {}", name, MAX_BLOCK_SIZE, size);
    }
    Ok(())
}

/// Validate stats configuration
pub fn validate_stats(stats: &StatsConfig) -> Result<()> {
    if stats.interval_ms == 0 {
        anyhow::bail!("stats interval must be greater than 0");
    }
    Ok(())
}
