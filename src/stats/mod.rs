//! Run statistics
//!
//! Lock-free counters shared by every worker of a run. Workers only ever add;
//! the dispatcher and the throughput monitor read without synchronizing with
//! the writers.
//!
//! # Example
//!
//! ```
//! use blockwarm::stats::RunStats;
//!
//! let stats = RunStats::new();
//! stats.record_completed(262_144);
//! stats.record_failed();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.blocks_completed, 1);
//! assert_eq!(snapshot.blocks_failed, 1);
//! assert_eq!(snapshot.bytes_read, 262_144);
//! ```

pub mod live;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cache-line aligned atomic counter to prevent false sharing
///
/// Every worker bumps the same counters after each block, so each one gets its
/// own 64-byte cache line.
///
/// # Memory Layout
///
/// ```text
/// [value: 8 bytes][padding: 56 bytes] = 64 bytes total
/// ```
#[repr(align(64))]
#[derive(Debug)]
pub struct AlignedCounter {
    value: AtomicU64,
    _padding: [u8; 56],
}

impl AlignedCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            _padding: [0; 56],
        }
    }

    /// Increment the counter by `val`
    ///
    /// Relaxed ordering: counters are independent and readers only need an
    /// eventually consistent view.
    #[inline]
    pub fn add(&self, val: u64) {
        self.value.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for AlignedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters and clock for one warmup run
#[derive(Debug)]
pub struct RunStats {
    blocks_completed: AlignedCounter,
    blocks_failed: AlignedCounter,
    bytes_read: AlignedCounter,
    start: Instant,
}

/// Point-in-time copy of [`RunStats`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub blocks_completed: u64,
    pub blocks_failed: u64,
    pub bytes_read: u64,
    pub elapsed: Duration,
}

impl RunStats {
    /// Create zeroed counters; the run clock starts now
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// Create zeroed counters for a run that began at `start`
    pub fn started_at(start: Instant) -> Self {
        Self {
            blocks_completed: AlignedCounter::new(),
            blocks_failed: AlignedCounter::new(),
            bytes_read: AlignedCounter::new(),
            start,
        }
    }

    /// Record a warmed block of `bytes` bytes
    #[inline]
    pub fn record_completed(&self, bytes: u64) {
        self.bytes_read.add(bytes);
        self.blocks_completed.add(1);
    }

    #[inline]
    pub fn record_failed(&self) {
        self.blocks_failed.add(1);
    }

    #[inline]
    pub fn blocks_completed(&self) -> u64 {
        self.blocks_completed.get()
    }

    #[inline]
    pub fn blocks_failed(&self) -> u64 {
        self.blocks_failed.get()
    }

    #[inline]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.get()
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_completed: self.blocks_completed(),
            blocks_failed: self.blocks_failed(),
            bytes_read: self.bytes_read(),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_counter_size() {
        assert_eq!(std::mem::size_of::<AlignedCounter>(), 64);
        assert_eq!(std::mem::align_of::<AlignedCounter>(), 64);
    }

    #[test]
    fn test_aligned_counter_operations() {
        let counter = AlignedCounter::new();
        assert_eq!(counter.get(), 0);

        counter.add(10);
        counter.add(5);
        assert_eq!(counter.get(), 15);
    }

    #[test]
    fn test_run_stats_new() {
        let stats = RunStats::new();
        assert_eq!(stats.blocks_completed(), 0);
        assert_eq!(stats.blocks_failed(), 0);
        assert_eq!(stats.bytes_read(), 0);
    }

    #[test]
    fn test_record_completed_and_failed() {
        let stats = RunStats::new();
        stats.record_completed(1024);
        stats.record_completed(512);
        stats.record_failed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocks_completed, 2);
        assert_eq!(snapshot.blocks_failed, 1);
        assert_eq!(snapshot.bytes_read, 1536);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = RunStats::new();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        stats.record_completed(4096);
                    }
                });
            }
        });

        assert_eq!(stats.blocks_completed(), 8000);
        assert_eq!(stats.bytes_read(), 8000 * 4096);
    }

    #[test]
    fn test_started_at() {
        let start = Instant::now() - Duration::from_secs(2);
        let stats = RunStats::started_at(start);
        assert_eq!(stats.start(), start);
        assert!(stats.elapsed() >= Duration::from_secs(2));
    }
}
