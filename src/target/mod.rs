//! Warmup targets
//!
//! A target is a file (or raw block device) opened read-only for the duration of
//! a run. This module holds the options that control how targets avoid the page
//! cache; [`file::FileTarget`] does the opening and cache invalidation.
//!
//! # Cache avoidance
//!
//! Two mechanisms are combined:
//!
//! - **Direct IO** (`O_DIRECT`): reads go straight from the device into the
//!   caller's buffer and never populate the page cache. Buffers, offsets and
//!   lengths must be aligned to the device's logical block size.
//! - **Cache drop advisory** (`posix_fadvise(POSIX_FADV_DONTNEED)`): asks the
//!   kernel to evict whatever pages of the file are already cached. Issued before
//!   and after the read pass. A failed advisory is only a warning.

pub mod file;

use file::FileTarget;
use serde::{Deserialize, Serialize};

/// Evicts a target's cached pages
///
/// Failures are warnings to the caller, never fatal.
pub trait CacheDropper: Send + Sync {
    fn drop_cache(&self, target: &FileTarget) -> crate::Result<()>;
}

/// `posix_fadvise(POSIX_FADV_DONTNEED)` over the whole file
#[derive(Debug, Default, Clone, Copy)]
pub struct FadviseDropper;

impl CacheDropper for FadviseDropper {
    fn drop_cache(&self, target: &FileTarget) -> crate::Result<()> {
        target.drop_cache()
    }
}

/// How targets are opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMode {
    /// Open with `O_DIRECT` to bypass the page cache
    pub direct: bool,

    /// Advise the kernel to drop cached pages before and after the read pass
    pub drop_cache: bool,
}

impl Default for OpenMode {
    fn default() -> Self {
        Self {
            direct: true,
            drop_cache: true,
        }
    }
}

impl OpenMode {
    /// Buffered reads with cache drops only; works on filesystems without
    /// direct IO support (tmpfs, some FUSE mounts)
    pub fn buffered() -> Self {
        Self {
            direct: false,
            drop_cache: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fadvise_dropper_on_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cached.bin");
        std::fs::write(&path, vec![7u8; 8192]).unwrap();

        let target = FileTarget::open(&path, OpenMode::buffered()).unwrap();
        assert!(FadviseDropper.drop_cache(&target).is_ok());
    }

    #[test]
    fn test_default_mode_is_direct_with_cache_drop() {
        let mode = OpenMode::default();
        assert!(mode.direct);
        assert!(mode.drop_cache);
        assert!(!OpenMode::buffered().direct);
    }
}
