//! Coordinator module
//!
//! Drives one warmup run through its phases:
//!
//! 1. **Planning**: open every target (the first failure aborts the run before
//!    any read is issued), compute the [`BlockSizePlan`], drop cached pages.
//! 2. **Dispatching**: start the workers on a bounded queue and feed it every
//!    block, file by file, in block order. A full queue blocks the dispatcher.
//! 3. **Draining**: close the queue, wait for every worker, stop the
//!    throughput monitor, drop cached pages again.
//! 4. **Done**: build the [`WarmupReport`].
//!
//! Workers and the monitor run on scoped threads, so block descriptors can
//! borrow the run's open targets directly.
//!
//! # Example
//!
//! ```no_run
//! use blockwarm::{Config, Warmup};
//! use std::path::PathBuf;
//!
//! let report = Warmup::new(Config::default()).run(&[PathBuf::from("/data/model.bin")])?;
//! println!("{} of {} blocks warmed", report.blocks_completed, report.blocks_planned);
//! # Ok::<(), blockwarm::error::WarmupError>(())
//! ```

use crate::config::validator::validate_config;
use crate::config::Config;
use crate::engine::sync::SyncEngine;
use crate::engine::ReadEngine;
use crate::error::WarmupError;
use crate::output::text::render_overall_stats;
use crate::output::{EventSink, FileSummary, TracingSink, WarmupEvent, WarmupReport};
use crate::plan::advisor::{BlockSizeAdvisor, FixedAdvisor};
use crate::plan::sizing::BlockSizePlan;
use crate::plan::{plan_file, BlockLayout};
use crate::stats::live::{ThroughputMonitor, ThroughputSample};
use crate::stats::RunStats;
use crate::target::file::FileTarget;
use crate::target::{CacheDropper, FadviseDropper};
use crate::util::buffer::BufferPool;
use crate::worker::Worker;
use chrono::Utc;
use crossbeam::channel;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Planning,
    Dispatching,
    Draining,
    Done,
}

/// Capacity of the block queue: about two blocks in flight per worker
pub fn queue_capacity(workers: usize, total_blocks: u64) -> usize {
    let blocks = usize::try_from(total_blocks).unwrap_or(usize::MAX);
    workers.saturating_mul(2).min(blocks).max(1)
}

/// A configured warmup, reusable across runs
pub struct Warmup {
    config: Config,
    engine: Arc<dyn ReadEngine>,
    advisor: Option<Arc<dyn BlockSizeAdvisor>>,
    sink: Arc<dyn EventSink>,
    dropper: Arc<dyn CacheDropper>,
    phase: Mutex<Option<RunPhase>>,
}

impl Warmup {
    /// Warmup with the `pread` engine, the configured advisor and `tracing` events
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: Arc::new(SyncEngine::new()),
            advisor: None,
            sink: Arc::new(TracingSink),
            dropper: Arc::new(FadviseDropper),
            phase: Mutex::new(None),
        }
    }

    /// Replace the read engine
    pub fn with_engine(mut self, engine: impl ReadEngine + 'static) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    /// Replace the block size advisor used for adaptive sizing
    ///
    /// Takes precedence over both the configured advisor kind and a configured
    /// sector size override.
    pub fn with_advisor(mut self, advisor: impl BlockSizeAdvisor + 'static) -> Self {
        self.advisor = Some(Arc::new(advisor));
        self
    }

    /// Send run events to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the cache drop advisory issued before and after the read pass
    pub fn with_cache_dropper(mut self, dropper: impl CacheDropper + 'static) -> Self {
        self.dropper = Arc::new(dropper);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Phase of the current or most recent run; `None` before the first run
    pub fn phase(&self) -> Option<RunPhase> {
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, phase: RunPhase) {
        debug!(?phase, "run phase");
        *self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(phase);
    }

    fn advisor(&self) -> Arc<dyn BlockSizeAdvisor> {
        if let Some(advisor) = &self.advisor {
            return Arc::clone(advisor);
        }
        match self.config.sizing.sector_size {
            Some(sector) => Arc::new(FixedAdvisor::new(sector)),
            None => Arc::from(self.config.sizing.advisor.build()),
        }
    }

    /// Warm every file in `paths`
    ///
    /// Per-block read failures do not fail the run; they are reported as
    /// [`WarmupEvent::BlockFailed`] and counted in the report.
    ///
    /// # Errors
    ///
    /// Fatal setup problems, all detected before the first read:
    /// - [`WarmupError::Config`] for an invalid configuration
    /// - [`WarmupError::Open`] / [`WarmupError::Stat`] for an unusable path
    /// - [`WarmupError::SectorSize`] when adaptive sizing cannot query the device
    /// - [`WarmupError::Spawn`] when a thread cannot be started
    pub fn run(&self, paths: &[PathBuf]) -> Result<WarmupReport, WarmupError> {
        let started_at = Utc::now();
        let start = Instant::now();
        self.enter(RunPhase::Planning);

        validate_config(&self.config).map_err(|e| WarmupError::Config(format!("{:#}", e)))?;

        if paths.is_empty() {
            self.sink.emit(WarmupEvent::NoFiles);
            self.enter(RunPhase::Done);
            return Ok(WarmupReport::empty(started_at));
        }

        let targets = paths
            .iter()
            .map(|path| FileTarget::open(path, self.config.io))
            .collect::<Result<Vec<_>, _>>()?;

        let advisor = self.advisor();
        let plan = BlockSizePlan::compute(&self.config.sizing, &targets, advisor.as_ref(), self.config.io.direct)?;

        let files: Vec<FileSummary> = targets
            .iter()
            .map(|t| FileSummary {
                path: t.path().to_path_buf(),
                size: t.size(),
                blocks: BlockLayout::new(t.size(), plan.block_size).block_count(),
            })
            .collect();
        let total_blocks: u64 = files.iter().map(|f| f.blocks).sum();

        let pool = BufferPool::new(plan.block_size as usize, plan.alignment as usize)
            .map_err(|e| WarmupError::Config(format!("{:#}", e)))?;

        self.drop_caches(&targets);

        let stats = RunStats::started_at(start);
        let samples = self.dispatch(&targets, &plan, total_blocks, &pool, &stats)?;

        self.drop_caches(&targets);
        self.enter(RunPhase::Done);

        let report = WarmupReport::from_run(started_at, files, plan, stats.snapshot(), samples);
        debug!(
            completed = report.blocks_completed,
            failed = report.blocks_failed,
            buffers = pool.allocated_count(),
            "run finished"
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        targets: &[FileTarget],
        plan: &BlockSizePlan,
        total_blocks: u64,
        pool: &BufferPool,
        stats: &RunStats,
    ) -> Result<Vec<ThroughputSample>, WarmupError> {
        let engine = self.engine.as_ref();
        let sink = self.sink.as_ref();

        std::thread::scope(|s| {
            let monitor = if self.config.stats.enabled {
                let monitor = ThroughputMonitor::new(stats, plan.block_size, self.config.stats.interval(), sink);
                Some(monitor.spawn(s)?)
            } else {
                None
            };

            let (tx, rx) = channel::bounded(queue_capacity(plan.workers, total_blocks));

            let mut handles = Vec::with_capacity(plan.workers);
            for id in 0..plan.workers {
                let worker = Worker::new(id, engine, pool, stats, sink, plan.block_size, plan.alignment);
                let rx = rx.clone();
                let name = format!("blockwarm-worker-{}", id);
                let handle = std::thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(s, move || worker.run(rx))
                    .map_err(|source| WarmupError::Spawn { name, source })?;
                handles.push(handle);
            }
            drop(rx);

            self.enter(RunPhase::Dispatching);
            'files: for target in targets {
                self.sink.emit(WarmupEvent::FileStarted {
                    path: target.path().to_path_buf(),
                    size: target.size(),
                    blocks: BlockLayout::new(target.size(), plan.block_size).block_count(),
                });
                for block in plan_file(target, plan.block_size) {
                    // Fails only if every worker is gone
                    if tx.send(block).is_err() {
                        break 'files;
                    }
                }
            }
            drop(tx);

            self.enter(RunPhase::Draining);
            for handle in handles {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }

            Ok(monitor.map(|m| m.stop()).unwrap_or_default())
        })
    }

    fn drop_caches(&self, targets: &[FileTarget]) {
        if !self.config.io.drop_cache {
            return;
        }
        for target in targets {
            if let Err(e) = self.dropper.drop_cache(target) {
                self.sink.emit(WarmupEvent::CacheDropFailed {
                    path: target.path().to_path_buf(),
                    error: format!("{:#}", e),
                });
            }
        }
    }
}

/// Warm `paths` with the default configuration
///
/// With `show_stats`, prints the "Overall Stats" summary to stdout afterwards.
pub fn warm_files(paths: &[PathBuf], show_stats: bool) -> Result<WarmupReport, WarmupError> {
    let report = Warmup::new(Config::default()).run(paths)?;
    if show_stats {
        print!("{}", render_overall_stats(&report));
    }
    Ok(report)
}
