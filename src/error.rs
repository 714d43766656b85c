//! Fatal error types
//!
//! Only setup failures are fatal: they abort the run before any block is
//! dispatched. Per-block read failures never surface here; they are reported as
//! events and counted in [`RunStats`](crate::stats::RunStats).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal error for a warmup run
#[derive(Error, Debug)]
pub enum WarmupError {
    /// The target could not be opened (missing, unreadable, or the filesystem
    /// rejected direct IO)
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The target was opened but its size could not be determined
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The physical sector size of the backing device could not be determined
    #[error("failed to determine physical sector size for {}: {reason}", path.display())]
    SectorSize { path: PathBuf, reason: String },

    /// Invalid run configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A worker or monitor thread could not be started
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl WarmupError {
    /// Build a [`WarmupError::SectorSize`] from anything printable
    pub fn sector_size(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        WarmupError::SectorSize {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
