//! Block-size advisors
//!
//! An advisor reports the physical sector size of the device backing a path.
//! The adaptive sizing policy builds its block size from that value, so a wrong
//! guess would break O_DIRECT alignment; every advisor therefore fails with
//! [`WarmupError::SectorSize`] instead of falling back to a default.
//!
//! Implementations:
//!
//! - [`SysfsAdvisor`]: `BLKPBSZGET` for block devices, sysfs lookup by device
//!   number for regular files
//! - [`LsblkAdvisor`]: shells out to `df` and `lsblk`
//! - [`FixedAdvisor`]: fixed answer, for tests and explicit overrides

use crate::error::WarmupError;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;

// _IO(0x12, 123): physical block size of a block device
const BLKPBSZGET: libc::c_ulong = 0x127b;

/// Source of physical sector sizes
pub trait BlockSizeAdvisor: Send + Sync {
    /// Physical sector size, in bytes, of the device backing `path`
    ///
    /// # Errors
    ///
    /// Returns [`WarmupError::SectorSize`] when the size cannot be determined or
    /// is not a positive power of two.
    fn physical_sector_size(&self, path: &Path) -> Result<u64, WarmupError>;

    /// Short name for logs and reports
    fn name(&self) -> &'static str;
}

/// Advisor selection for configuration files and the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorKind {
    /// Query the kernel directly (ioctl / sysfs)
    #[default]
    Sysfs,
    /// Shell out to df + lsblk
    Lsblk,
}

impl AdvisorKind {
    /// Build the advisor this kind names
    pub fn build(self) -> Box<dyn BlockSizeAdvisor> {
        match self {
            AdvisorKind::Sysfs => Box::new(SysfsAdvisor),
            AdvisorKind::Lsblk => Box::new(LsblkAdvisor::default()),
        }
    }
}

impl std::fmt::Display for AdvisorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvisorKind::Sysfs => write!(f, "sysfs"),
            AdvisorKind::Lsblk => write!(f, "lsblk"),
        }
    }
}

fn validate_sector_size(path: &Path, size: u64) -> Result<u64, WarmupError> {
    if size == 0 || !size.is_power_of_two() {
        return Err(WarmupError::sector_size(
            path,
            format!("implausible physical sector size {}", size),
        ));
    }
    Ok(size)
}

/// Kernel-backed advisor
///
/// Raw block devices are asked directly with `BLKPBSZGET`. For regular files the
/// filesystem's device number is resolved through `/sys/dev/block/MAJ:MIN`; a
/// partition has no `queue/` directory of its own, so its parent disk is tried
/// next.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysfsAdvisor;

impl SysfsAdvisor {
    fn from_ioctl(path: &Path) -> Result<u64, WarmupError> {
        let file = File::open(path).map_err(|e| WarmupError::sector_size(path, e))?;
        let mut size: libc::c_uint = 0;
        // SAFETY: BLKPBSZGET writes a single unsigned int through the pointer
        let result = unsafe { libc::ioctl(file.as_raw_fd(), BLKPBSZGET as _, &mut size) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(WarmupError::sector_size(path, format!("ioctl(BLKPBSZGET) failed: {}", err)));
        }
        validate_sector_size(path, size as u64)
    }

    fn from_sysfs(path: &Path, dev: u64) -> Result<u64, WarmupError> {
        let (major, minor) = split_dev(dev);
        let device_dir = PathBuf::from(format!("/sys/dev/block/{}:{}", major, minor));

        let candidates = [
            device_dir.join("queue/physical_block_size"),
            device_dir.join("../queue/physical_block_size"),
        ];

        for candidate in &candidates {
            if let Ok(contents) = fs::read_to_string(candidate) {
                let size: u64 = contents.trim().parse().map_err(|e| {
                    WarmupError::sector_size(path, format!("{}: {}", candidate.display(), e))
                })?;
                return validate_sector_size(path, size);
            }
        }

        Err(WarmupError::sector_size(
            path,
            format!("no physical_block_size under {} (device {}:{})", device_dir.display(), major, minor),
        ))
    }
}

impl BlockSizeAdvisor for SysfsAdvisor {
    fn physical_sector_size(&self, path: &Path) -> Result<u64, WarmupError> {
        let metadata = fs::metadata(path).map_err(|e| WarmupError::sector_size(path, e))?;

        if metadata.file_type().is_block_device() {
            Self::from_ioctl(path)
        } else {
            Self::from_sysfs(path, metadata.dev())
        }
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }
}

/// Split a Linux `dev_t` into (major, minor) using the glibc encoding
fn split_dev(dev: u64) -> (u64, u64) {
    let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
    (major, minor)
}

/// Advisor that shells out to platform utilities
///
/// `df --output=source <path>` names the device holding the file, then
/// `lsblk --nodeps --noheadings --output PHY-SEC <device>` reports its physical
/// sector size.
#[derive(Debug, Clone)]
pub struct LsblkAdvisor {
    df: PathBuf,
    lsblk: PathBuf,
}

impl Default for LsblkAdvisor {
    fn default() -> Self {
        Self {
            df: PathBuf::from("df"),
            lsblk: PathBuf::from("lsblk"),
        }
    }
}

impl LsblkAdvisor {
    /// Use explicit tool paths instead of `$PATH` lookup
    pub fn with_tools(df: impl Into<PathBuf>, lsblk: impl Into<PathBuf>) -> Self {
        Self {
            df: df.into(),
            lsblk: lsblk.into(),
        }
    }

    fn run(&self, path: &Path, program: &Path, args: &[&OsStr]) -> Result<String, WarmupError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| WarmupError::sector_size(path, format!("failed to run {}: {}", program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WarmupError::sector_size(
                path,
                format!("{} exited with {}: {}", program.display(), output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Device name holding `path`, from `df --output=source`
    fn device_for(&self, path: &Path) -> Result<String, WarmupError> {
        let stdout = self.run(path, &self.df, &[OsStr::new("--output=source"), path.as_os_str()])?;
        parse_df_source(&stdout)
            .ok_or_else(|| WarmupError::sector_size(path, format!("unexpected df output: {:?}", stdout)))
    }
}

impl BlockSizeAdvisor for LsblkAdvisor {
    fn physical_sector_size(&self, path: &Path) -> Result<u64, WarmupError> {
        let device = if fs::metadata(path).map(|m| m.file_type().is_block_device()).unwrap_or(false) {
            path.display().to_string()
        } else {
            self.device_for(path)?
        };

        let stdout = self.run(
            path,
            &self.lsblk,
            &[
                OsStr::new("--nodeps"),
                OsStr::new("--noheadings"),
                OsStr::new("--output"),
                OsStr::new("PHY-SEC"),
                OsStr::new(&device),
            ],
        )?;

        let size = parse_lsblk_sector(&stdout)
            .ok_or_else(|| WarmupError::sector_size(path, format!("unexpected lsblk output: {:?}", stdout)))?;
        validate_sector_size(path, size)
    }

    fn name(&self) -> &'static str {
        "lsblk"
    }
}

/// Second line of `df --output=source` (the first is the header)
fn parse_df_source(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn parse_lsblk_sector(stdout: &str) -> Option<u64> {
    stdout.lines().map(str::trim).find(|l| !l.is_empty())?.parse().ok()
}

/// Advisor with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvisor {
    sector_size: u64,
}

impl FixedAdvisor {
    pub fn new(sector_size: u64) -> Self {
        Self { sector_size }
    }
}

impl BlockSizeAdvisor for FixedAdvisor {
    fn physical_sector_size(&self, path: &Path) -> Result<u64, WarmupError> {
        validate_sector_size(path, self.sector_size)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
