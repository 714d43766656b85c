//! Block size and worker count selection
//!
//! A run uses one [`BlockSizePlan`] for all of its files, computed once during
//! planning:
//!
//! - **Fixed**: the configured block size and worker count.
//! - **Adaptive**: the block size is built from the backing device's physical
//!   sector size, and the worker count depends on whether the run is small
//!   (largest file below one sector or below `small_file_threshold`) or large.
//!   Tiny files gain nothing from parallel reads, so they get a single worker
//!   by default.
//!
//! In both modes the block size is a multiple of the buffer alignment whenever
//! direct IO is on, so every block offset stays aligned.

use crate::config::SizingConfig;
use crate::error::WarmupError;
use crate::plan::advisor::BlockSizeAdvisor;
use crate::target::file::FileTarget;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the block size and worker count are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingPolicy {
    /// Configured block size and worker count
    #[default]
    Fixed,
    /// Derived from the physical sector size and the largest file
    Adaptive,
}

impl std::fmt::Display for SizingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingPolicy::Fixed => write!(f, "fixed"),
            SizingPolicy::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Smallest alignment ever used for read buffers
pub const MIN_ALIGNMENT: u64 = 512;

/// Block size and concurrency chosen for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSizePlan {
    /// Nominal bytes per block
    pub block_size: u64,

    /// Number of read workers
    pub workers: usize,

    /// Read buffer alignment
    pub alignment: u64,

    /// Policy that produced this plan
    pub policy: SizingPolicy,

    /// Physical sector size reported by the advisor (adaptive mode only)
    pub sector_size: Option<u64>,

    /// Whether the small-file worker count was selected (adaptive mode only)
    pub small_files: bool,
}

/// Round `value` up to the next multiple of `multiple`
#[inline]
pub fn round_up(value: u64, multiple: u64) -> u64 {
    value.div_ceil(multiple) * multiple
}

impl BlockSizePlan {
    /// Compute the plan for `targets`
    ///
    /// `direct` reports whether targets were opened with O_DIRECT; it decides
    /// whether the fixed block size must be rounded to the alignment.
    ///
    /// # Errors
    ///
    /// Adaptive mode propagates the advisor's [`WarmupError::SectorSize`] for the
    /// first file whose sector size cannot be determined, and reports a
    /// [`WarmupError::Config`] if called without targets.
    pub fn compute(
        config: &SizingConfig,
        targets: &[FileTarget],
        advisor: &dyn BlockSizeAdvisor,
        direct: bool,
    ) -> Result<Self, WarmupError> {
        let logical = targets
            .iter()
            .map(FileTarget::logical_block_size)
            .max()
            .unwrap_or(MIN_ALIGNMENT)
            .max(MIN_ALIGNMENT);

        let plan = match config.policy {
            SizingPolicy::Fixed => {
                let block_size = if direct {
                    round_up(config.block_size, logical)
                } else {
                    config.block_size
                };
                Self {
                    block_size,
                    workers: config.workers,
                    alignment: logical,
                    policy: SizingPolicy::Fixed,
                    sector_size: None,
                    small_files: false,
                }
            }
            SizingPolicy::Adaptive => Self::adaptive(config, targets, advisor, logical)?,
        };

        debug!(
            policy = %plan.policy,
            block_size = plan.block_size,
            workers = plan.workers,
            alignment = plan.alignment,
            "computed block size plan"
        );

        Ok(plan)
    }

    fn adaptive(
        config: &SizingConfig,
        targets: &[FileTarget],
        advisor: &dyn BlockSizeAdvisor,
        logical: u64,
    ) -> Result<Self, WarmupError> {
        if targets.is_empty() {
            return Err(WarmupError::Config(
                "adaptive sizing needs at least one target".to_string(),
            ));
        }

        let mut sector = 0;
        for target in targets {
            let size = advisor.physical_sector_size(target.path())?;
            debug!(path = %target.path().display(), sector_size = size, advisor = advisor.name(), "queried sector size");
            sector = sector.max(size);
        }

        let largest = targets.iter().map(FileTarget::size).max().unwrap_or(0);
        let small_files = largest < sector || largest < config.small_file_threshold;

        let (nominal, workers) = if small_files {
            (config.block_size_small, config.small_file_workers)
        } else {
            (config.block_size_large, config.large_file_workers)
        };

        let alignment = sector.max(logical);

        Ok(Self {
            block_size: round_up(nominal.max(1), alignment),
            workers,
            alignment,
            policy: SizingPolicy::Adaptive,
            sector_size: Some(sector),
            small_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::advisor::FixedAdvisor;
    use crate::target::OpenMode;
    use std::path::Path;
    use tempfile::TempDir;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    struct FailingAdvisor;

    impl BlockSizeAdvisor for FailingAdvisor {
        fn physical_sector_size(&self, path: &Path) -> Result<u64, WarmupError> {
            Err(WarmupError::sector_size(path, "no device"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn target_of_len(dir: &TempDir, name: &str, len: u64) -> FileTarget {
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(len).unwrap();
        FileTarget::open(&path, OpenMode::buffered()).unwrap()
    }

    fn adaptive_config() -> SizingConfig {
        SizingConfig {
            policy: SizingPolicy::Adaptive,
            block_size_small: 64 * KIB,
            block_size_large: MIB,
            small_file_threshold: 2 * MIB,
            small_file_workers: 1,
            large_file_workers: 8,
            ..SizingConfig::default()
        }
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 512), 0);
        assert_eq!(round_up(1, 512), 512);
        assert_eq!(round_up(512, 512), 512);
        assert_eq!(round_up(1000, 4096), 4096);
        assert_eq!(round_up(300 * KIB, 4096), 300 * KIB);
    }

    #[test]
    fn test_fixed_plan_uses_configured_values() {
        let dir = TempDir::new().unwrap();
        let targets = vec![target_of_len(&dir, "a", MIB)];
        let config = SizingConfig {
            policy: SizingPolicy::Fixed,
            block_size: 256 * KIB,
            workers: 4,
            ..SizingConfig::default()
        };

        let plan = BlockSizePlan::compute(&config, &targets, &FailingAdvisor, false).unwrap();
        assert_eq!(plan.block_size, 256 * KIB);
        assert_eq!(plan.workers, 4);
        assert_eq!(plan.policy, SizingPolicy::Fixed);
        assert_eq!(plan.sector_size, None);
    }

    #[test]
    fn test_fixed_plan_aligns_for_direct_io() {
        let dir = TempDir::new().unwrap();
        let targets = vec![target_of_len(&dir, "a", MIB)];
        let config = SizingConfig {
            policy: SizingPolicy::Fixed,
            block_size: 1000,
            ..SizingConfig::default()
        };

        let plan = BlockSizePlan::compute(&config, &targets, &FailingAdvisor, true).unwrap();
        assert_eq!(plan.block_size % plan.alignment, 0);
        assert!(plan.block_size >= 1000);
    }

    #[test]
    fn test_adaptive_small_file() {
        let dir = TempDir::new().unwrap();
        let targets = vec![target_of_len(&dir, "tiny", 10 * KIB)];

        let plan = BlockSizePlan::compute(&adaptive_config(), &targets, &FixedAdvisor::new(4096), true).unwrap();
        assert!(plan.small_files);
        assert_eq!(plan.workers, 1);
        assert_eq!(plan.block_size, 64 * KIB);
        assert_eq!(plan.sector_size, Some(4096));
        assert!(plan.alignment >= 4096);
    }

    #[test]
    fn test_adaptive_file_below_one_sector() {
        let dir = TempDir::new().unwrap();
        let targets = vec![target_of_len(&dir, "tiny", 100)];
        let config = SizingConfig {
            small_file_threshold: 0,
            ..adaptive_config()
        };

        let plan = BlockSizePlan::compute(&config, &targets, &FixedAdvisor::new(4096), true).unwrap();
        assert!(plan.small_files);
        assert_eq!(plan.workers, 1);
    }

    #[test]
    fn test_adaptive_large_file() {
        let dir = TempDir::new().unwrap();
        let targets = vec![
            target_of_len(&dir, "small", KIB),
            target_of_len(&dir, "large", 8 * MIB),
        ];

        let plan = BlockSizePlan::compute(&adaptive_config(), &targets, &FixedAdvisor::new(512), true).unwrap();
        assert!(!plan.small_files);
        assert_eq!(plan.workers, 8);
        assert_eq!(plan.block_size, MIB);
    }

    #[test]
    fn test_adaptive_block_size_is_sector_multiple() {
        let dir = TempDir::new().unwrap();
        let targets = vec![target_of_len(&dir, "large", 8 * MIB)];
        let config = SizingConfig {
            block_size_large: 100_000,
            ..adaptive_config()
        };

        let plan = BlockSizePlan::compute(&config, &targets, &FixedAdvisor::new(4096), false).unwrap();
        assert_eq!(plan.block_size % 4096, 0);
        assert_eq!(plan.block_size, 102_400);
    }

    #[test]
    fn test_adaptive_advisor_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let targets = vec![target_of_len(&dir, "a", MIB)];

        let err = BlockSizePlan::compute(&adaptive_config(), &targets, &FailingAdvisor, true).unwrap_err();
        assert!(matches!(err, WarmupError::SectorSize { .. }));
    }

    #[test]
    fn test_adaptive_without_targets() {
        let err = BlockSizePlan::compute(&adaptive_config(), &[], &FixedAdvisor::new(512), true).unwrap_err();
        assert!(matches!(err, WarmupError::Config(_)));
    }
}
