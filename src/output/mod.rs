//! Run events and the completion report
//!
//! Progress and warnings flow through an [`EventSink`] injected into the run, so
//! the library never writes to the terminal on its own. The binary uses
//! [`TracingSink`]; tests capture events with [`MemorySink`].
//!
//! The final [`WarmupReport`] is rendered by [`text`] or [`json`].

pub mod json;
pub mod text;

use crate::plan::sizing::BlockSizePlan;
use crate::stats::live::ThroughputSample;
use crate::stats::StatsSnapshot;
use crate::util::time::{bytes_to_mb, throughput_mbps};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

/// Something worth telling the operator about during a run
#[derive(Debug, Clone, PartialEq)]
pub enum WarmupEvent {
    /// The run was given no files
    NoFiles,

    /// Blocks of this file are about to be dispatched
    FileStarted { path: PathBuf, size: u64, blocks: u64 },

    /// `posix_fadvise(DONTNEED)` failed; the run continues
    CacheDropFailed { path: PathBuf, error: String },

    /// A block read failed or came back short before end of file
    BlockFailed { path: PathBuf, offset: u64, error: String },

    /// Periodic throughput measurement
    Sample(ThroughputSample),
}

/// Receiver for run events
///
/// Called concurrently from the dispatcher, every worker and the monitor.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WarmupEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: WarmupEvent) {
        match event {
            WarmupEvent::NoFiles => info!("No files to warm up"),
            WarmupEvent::FileStarted { path, size, blocks } => {
                info!(size, blocks, "Warming up file: {}", path.display())
            }
            WarmupEvent::CacheDropFailed { path, error } => {
                warn!(%error, "cache drop advisory failed: {}", path.display())
            }
            WarmupEvent::BlockFailed { path, offset, error } => {
                warn!(offset, %error, "block read failed: {}", path.display())
            }
            WarmupEvent::Sample(sample) => info!(
                elapsed_secs = sample.elapsed.as_secs_f64(),
                blocks = sample.blocks_completed,
                "throughput: {:.2} MB/s",
                sample.throughput_mbps
            ),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<WarmupEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event received so far, in arrival order
    pub fn events(&self) -> Vec<WarmupEvent> {
        self.lock().clone()
    }

    pub fn block_failures(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, WarmupEvent::BlockFailed { .. }))
            .count()
    }

    pub fn samples(&self) -> Vec<ThroughputSample> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                WarmupEvent::Sample(sample) => Some(*sample),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<WarmupEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: WarmupEvent) {
        self.lock().push(event);
    }
}

/// One warmed file in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: PathBuf,
    pub size: u64,
    pub blocks: u64,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupReport {
    /// Wall-clock time the run started
    pub started_at: DateTime<Utc>,

    pub files: Vec<FileSummary>,

    /// Sizing used for the run; absent when there was nothing to warm
    pub plan: Option<BlockSizePlan>,

    pub blocks_planned: u64,
    pub blocks_completed: u64,
    pub blocks_failed: u64,

    /// Sum of file sizes
    pub total_bytes: u64,

    /// Bytes covered by completed blocks
    pub bytes_read: u64,

    pub elapsed_secs: f64,

    /// `bytes_read` over the whole run, in MB/s
    pub throughput_mbps: f64,

    /// Periodic measurements (empty unless stats reporting is enabled)
    pub samples: Vec<ThroughputSample>,
}

impl WarmupReport {
    /// Report for a run that had nothing to do
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            files: Vec::new(),
            plan: None,
            blocks_planned: 0,
            blocks_completed: 0,
            blocks_failed: 0,
            total_bytes: 0,
            bytes_read: 0,
            elapsed_secs: 0.0,
            throughput_mbps: 0.0,
            samples: Vec::new(),
        }
    }

    /// Assemble the report from the final counters
    pub fn from_run(
        started_at: DateTime<Utc>,
        files: Vec<FileSummary>,
        plan: BlockSizePlan,
        stats: StatsSnapshot,
        samples: Vec<ThroughputSample>,
    ) -> Self {
        Self {
            started_at,
            blocks_planned: files.iter().map(|f| f.blocks).sum(),
            total_bytes: files.iter().map(|f| f.size).sum(),
            files,
            plan: Some(plan),
            blocks_completed: stats.blocks_completed,
            blocks_failed: stats.blocks_failed,
            bytes_read: stats.bytes_read,
            elapsed_secs: stats.elapsed.as_secs_f64(),
            throughput_mbps: throughput_mbps(stats.bytes_read, stats.elapsed),
            samples,
        }
    }

    /// Data warmed, in MB
    pub fn data_mb(&self) -> f64 {
        bytes_to_mb(self.bytes_read)
    }

    /// Whether every planned block was read
    pub fn is_complete(&self) -> bool {
        self.blocks_completed == self.blocks_planned
    }
}

/// Serialize a `Duration` as fractional seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
