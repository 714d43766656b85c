//! Mock read engine for testing
//!
//! Simulates block reads without any syscalls, so coordinator and worker tests
//! are fast and deterministic on any filesystem.
//!
//! # Features
//!
//! - Fails reads at chosen offsets
//! - Simulates short reads
//! - Simulates latency with a configurable delay
//! - Records every request and the peak number of concurrent reads
//!
//! Clones share state, so a test can hand one clone to a run and inspect the
//! other afterwards.
//!
//! # Example
//!
//! ```
//! use blockwarm::engine::{ReadEngine, ReadOp};
//! use blockwarm::engine::mock::MockEngine;
//!
//! let engine = MockEngine::new();
//! engine.fail_at(4096);
//!
//! let mut buffer = vec![0u8; 4096];
//! let ok = engine.read(ReadOp { fd: 3, offset: 0, expected: 4096, buffer: &mut buffer });
//! assert_eq!(ok.unwrap(), 4096);
//!
//! let failed = engine.read(ReadOp { fd: 3, offset: 4096, expected: 4096, buffer: &mut buffer });
//! assert!(failed.is_err());
//! assert_eq!(engine.read_count(), 2);
//! ```

use super::{ReadEngine, ReadOp};
use crate::Result;
use std::collections::HashSet;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock engine for tests
#[derive(Clone, Default)]
pub struct MockEngine {
    /// Offsets whose reads fail (for any fd)
    fail_offsets: Arc<Mutex<HashSet<u64>>>,

    /// Bytes returned per read; 0 means the expected length
    bytes_per_read: Arc<Mutex<usize>>,

    /// Simulated latency per read
    delay: Arc<Mutex<Option<Duration>>>,

    /// Every request, in arrival order
    records: Arc<Mutex<Vec<ReadRecord>>>,

    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Record of a submitted read for test verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub fd: RawFd,
    pub offset: u64,
    pub expected: usize,
    pub request_len: usize,
    pub buffer_addr: usize,
}

impl MockEngine {
    /// Create a mock engine that succeeds every read with the expected length
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reads at `offset` fail
    pub fn fail_at(&self, offset: u64) {
        self.fail_offsets.lock().unwrap().insert(offset);
    }

    /// Return `bytes` from every successful read (simulates short reads)
    pub fn set_bytes_per_read(&self, bytes: usize) {
        *self.bytes_per_read.lock().unwrap() = bytes;
    }

    /// Sleep for `delay` inside every read
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Copy of all recorded reads
    pub fn reads(&self) -> Vec<ReadRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Recorded offsets in ascending order
    pub fn sorted_offsets(&self) -> Vec<u64> {
        let mut offsets: Vec<u64> = self.records.lock().unwrap().iter().map(|r| r.offset).collect();
        offsets.sort_unstable();
        offsets
    }

    /// Highest number of reads observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ReadEngine for MockEngine {
    fn read(&self, op: ReadOp<'_>) -> Result<usize> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.records.lock().unwrap().push(ReadRecord {
            fd: op.fd,
            offset: op.offset,
            expected: op.expected,
            request_len: op.buffer.len(),
            buffer_addr: op.buffer.as_ptr() as usize,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let result = if self.fail_offsets.lock().unwrap().contains(&op.offset) {
            Err(anyhow::anyhow!(
                "mock read failure: fd={}, offset={}",
                op.fd,
                op.offset
            ))
        } else {
            let bytes = *self.bytes_per_read.lock().unwrap();
            let n = if bytes == 0 { op.expected } else { bytes };
            Ok(n.min(op.buffer.len()))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
