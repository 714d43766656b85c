//! File target implementation
//!
//! Opens a regular file or raw block device read-only, optionally with
//! `O_DIRECT`, records its size and logical block size, and issues page cache
//! drop advisories.
//!
//! # Example
//!
//! ```no_run
//! use blockwarm::target::{OpenMode, file::FileTarget};
//!
//! let target = FileTarget::open("/data/model.bin", OpenMode::default())?;
//! println!("{} bytes, logical block {}", target.size(), target.logical_block_size());
//! target.drop_cache()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::OpenMode;
use crate::error::WarmupError;
use crate::Result;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

// ioctl request code for getting block device size in bytes
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

/// An open, read-only warmup target
///
/// The handle is shared by every worker reading this file. All reads are
/// positioned (`pread`), so the file cursor is never touched.
#[derive(Debug)]
pub struct FileTarget {
    /// Path the target was opened from
    path: PathBuf,

    /// Open handle; closed on drop
    file: File,

    /// Size in bytes (file length, or device size for block devices)
    size: u64,

    /// Logical block size for O_DIRECT alignment (detected at open)
    logical_block_size: u64,

    /// Whether the handle was opened with O_DIRECT
    direct: bool,

    /// Whether the target is a raw block device
    block_device: bool,
}

impl FileTarget {
    /// Open `path` for warming
    ///
    /// # Errors
    ///
    /// - [`WarmupError::Open`] if the path does not exist, is not readable, is a
    ///   directory, or the filesystem rejects `O_DIRECT`
    /// - [`WarmupError::Stat`] if the size cannot be determined
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> std::result::Result<Self, WarmupError> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true);
        if mode.direct {
            options.custom_flags(libc::O_DIRECT);
        }

        let file = options.open(&path).map_err(|source| WarmupError::Open {
            path: path.clone(),
            source,
        })?;

        let metadata = file.metadata().map_err(|source| WarmupError::Stat {
            path: path.clone(),
            source,
        })?;

        if metadata.is_dir() {
            return Err(WarmupError::Open {
                path,
                source: io::Error::from_raw_os_error(libc::EISDIR),
            });
        }

        let block_device = metadata.file_type().is_block_device();
        let size = if block_device {
            device_size(file.as_raw_fd()).map_err(|source| WarmupError::Stat {
                path: path.clone(),
                source,
            })?
        } else {
            metadata.len()
        };

        let logical_block_size = detect_logical_block_size(file.as_raw_fd());

        Ok(Self {
            path,
            file,
            size,
            logical_block_size,
            direct: mode.direct,
            block_device,
        })
    }

    /// Ask the kernel to drop any cached pages for the whole target
    ///
    /// # Errors
    ///
    /// Returns an error if `posix_fadvise` fails. Callers treat this as a
    /// warning: direct IO alone still keeps the read pass out of the cache.
    pub fn drop_cache(&self) -> Result<()> {
        // SAFETY: fd is valid for the lifetime of self
        let result = unsafe { libc::posix_fadvise(self.fd(), 0, 0, libc::POSIX_FADV_DONTNEED) };
        if result != 0 {
            let err = io::Error::from_raw_os_error(result);
            return Err(err).with_context(|| {
                format!("posix_fadvise(DONTNEED) failed: path={}", self.path.display())
            });
        }
        Ok(())
    }

    /// Raw file descriptor for positioned reads
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical block size of the backing device (typically 512 or 4096)
    pub fn logical_block_size(&self) -> u64 {
        self.logical_block_size
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    pub fn is_block_device(&self) -> bool {
        self.block_device
    }
}

/// Query a block device's size with BLKGETSIZE64
fn device_size(fd: RawFd) -> io::Result<u64> {
    let mut size: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes a single u64 through the pointer
    let result = unsafe { libc::ioctl(fd, BLKGETSIZE64 as _, &mut size) };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size)
}

/// Detect the logical block size used for O_DIRECT alignment
///
/// BLKSSZGET answers for block devices; regular files fall back to `st_blksize`
/// when it is a sane power of two, and to 512 otherwise.
fn detect_logical_block_size(fd: RawFd) -> u64 {
    let mut block_size: libc::c_int = 0;
    // SAFETY: BLKSSZGET writes a single c_int through the pointer
    let result = unsafe { libc::ioctl(fd, libc::BLKSSZGET as _, &mut block_size) };
    if result == 0 && block_size > 0 {
        return block_size as u64;
    }

    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fstat fills the zeroed struct
    let result = unsafe { libc::fstat(fd, &mut stat) };
    if result == 0 {
        let blksize = stat.st_blksize as u64;
        if blksize >= 512 && blksize.is_power_of_two() {
            return blksize;
        }
    }

    512
}
