//! Live throughput reporting
//!
//! While blocks are being read, a monitor thread wakes every interval, samples
//! the completed-block counter and reports the throughput since the previous
//! tick. The monitor shares nothing with the workers except the [`RunStats`]
//! counters, and never blocks them.
//!
//! # Example
//!
//! ```
//! use blockwarm::output::MemorySink;
//! use blockwarm::stats::RunStats;
//! use blockwarm::stats::live::ThroughputMonitor;
//! use std::time::Duration;
//!
//! let stats = RunStats::new();
//! let sink = MemorySink::new();
//!
//! let samples = std::thread::scope(|s| {
//!     let monitor = ThroughputMonitor::new(&stats, 4096, Duration::from_millis(10), &sink);
//!     let handle = monitor.spawn(s).unwrap();
//!     stats.record_completed(4096);
//!     std::thread::sleep(Duration::from_millis(50));
//!     handle.stop()
//! });
//! assert!(!samples.is_empty());
//! ```

use crate::error::WarmupError;
use crate::output::{EventSink, WarmupEvent};
use crate::stats::RunStats;
use crate::util::time::throughput_mbps;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::thread::{Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// One periodic throughput measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// Time since the run started
    #[serde(with = "crate::output::duration_secs")]
    pub elapsed: Duration,

    /// Time covered by this sample
    #[serde(with = "crate::output::duration_secs")]
    pub interval: Duration,

    /// Blocks completed during the interval times the block size, per second
    pub throughput_mbps: f64,

    /// Completed-block counter at sampling time
    pub blocks_completed: u64,
}

/// Periodic sampler of a run's completed-block counter
pub struct ThroughputMonitor<'a> {
    stats: &'a RunStats,
    block_size: u64,
    interval: Duration,
    sink: &'a dyn EventSink,
    last_blocks: u64,
    last_tick: Instant,
    samples: Vec<ThroughputSample>,
}

impl<'a> ThroughputMonitor<'a> {
    /// Create a monitor; the first interval starts now
    pub fn new(stats: &'a RunStats, block_size: u64, interval: Duration, sink: &'a dyn EventSink) -> Self {
        Self {
            stats,
            block_size,
            interval,
            sink,
            last_blocks: stats.blocks_completed(),
            last_tick: Instant::now(),
            samples: Vec::new(),
        }
    }

    /// Take a sample now, emit it and keep it for the report
    pub fn tick(&mut self) -> ThroughputSample {
        let now = Instant::now();
        let blocks = self.stats.blocks_completed();
        let delta_blocks = blocks.saturating_sub(self.last_blocks);
        let interval = now.duration_since(self.last_tick);

        let sample = ThroughputSample {
            elapsed: now.duration_since(self.stats.start()),
            interval,
            throughput_mbps: throughput_mbps(delta_blocks * self.block_size, interval),
            blocks_completed: blocks,
        };

        self.last_blocks = blocks;
        self.last_tick = now;
        self.samples.push(sample);
        self.sink.emit(WarmupEvent::Sample(sample));
        sample
    }

    /// Tick every interval until `stop` fires or is dropped
    ///
    /// Returns every sample taken.
    pub fn run(mut self, stop: Receiver<()>) -> Vec<ThroughputSample> {
        loop {
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.tick();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(samples = self.samples.len(), "throughput monitor stopped");
        self.samples
    }

    /// Run the monitor on a thread of `scope`
    ///
    /// # Errors
    ///
    /// Returns [`WarmupError::Spawn`] if the thread cannot be created.
    pub fn spawn<'scope>(self, scope: &'scope Scope<'scope, '_>) -> Result<MonitorHandle<'scope>, WarmupError>
    where
        'a: 'scope,
    {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let name = "blockwarm-monitor".to_string();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn_scoped(scope, move || self.run(stop_rx))
            .map_err(|source| WarmupError::Spawn { name, source })?;

        Ok(MonitorHandle {
            stop: stop_tx,
            handle,
        })
    }
}

/// Running monitor thread
pub struct MonitorHandle<'scope> {
    stop: Sender<()>,
    handle: ScopedJoinHandle<'scope, Vec<ThroughputSample>>,
}

impl MonitorHandle<'_> {
    /// Stop the monitor and collect its samples
    pub fn stop(self) -> Vec<ThroughputSample> {
        drop(self.stop);
        self.handle.join().unwrap_or_default()
    }
}

impl std::fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:6.1}s] {:.2} MB/s ({} blocks)",
            self.elapsed.as_secs_f64(),
            self.throughput_mbps,
            self.blocks_completed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;

    #[test]
    fn test_tick_computes_delta_throughput() {
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let mut monitor = ThroughputMonitor::new(&stats, 1024 * 1024, Duration::from_secs(5), &sink);

        for _ in 0..4 {
            stats.record_completed(1024 * 1024);
        }
        std::thread::sleep(Duration::from_millis(20));
        let first = monitor.tick();
        assert_eq!(first.blocks_completed, 4);
        assert!(first.throughput_mbps > 0.0);
        assert!(first.interval >= Duration::from_millis(20));

        // No progress since the last tick
        let second = monitor.tick();
        assert_eq!(second.blocks_completed, 4);
        assert_eq!(second.throughput_mbps, 0.0);

        assert_eq!(sink.samples().len(), 2);
    }

    #[test]
    fn test_monitor_stops_promptly() {
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let started = Instant::now();

        let samples = std::thread::scope(|s| {
            let monitor = ThroughputMonitor::new(&stats, 4096, Duration::from_secs(60), &sink);
            let handle = monitor.spawn(s).unwrap();
            handle.stop()
        });

        assert!(samples.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_monitor_samples_periodically() {
        let stats = RunStats::new();
        let sink = MemorySink::new();

        let samples = std::thread::scope(|s| {
            let monitor = ThroughputMonitor::new(&stats, 4096, Duration::from_millis(10), &sink);
            let handle = monitor.spawn(s).unwrap();
            for _ in 0..10 {
                stats.record_completed(4096);
                std::thread::sleep(Duration::from_millis(5));
            }
            std::thread::sleep(Duration::from_millis(30));
            handle.stop()
        });

        assert!(samples.len() >= 2);
        assert_eq!(samples.len(), sink.samples().len());
        assert!(samples.windows(2).all(|w| w[0].elapsed <= w[1].elapsed));
        assert_eq!(samples.last().unwrap().blocks_completed, 10);
    }

    #[test]
    fn test_sample_serializes_durations_as_seconds() {
        let sample = ThroughputSample {
            elapsed: Duration::from_millis(1500),
            interval: Duration::from_secs(1),
            throughput_mbps: 12.5,
            blocks_completed: 7,
        };

        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["elapsed"], 1.5);
        assert_eq!(json["interval"], 1.0);
        assert_eq!(json["blocks_completed"], 7);
    }
}
