//! Read worker
//!
//! A worker pulls block descriptors off the run's queue until it is closed and
//! reads each block into a pooled buffer through the run's [`ReadEngine`]. The
//! data itself is discarded; the point of the read is to pull the block from the
//! device.
//!
//! # Architecture
//!
//! Every worker of a run shares:
//! - **ReadEngine**: performs the positioned read
//! - **BufferPool**: supplies aligned destination buffers
//! - **RunStats**: completed/failed counters
//! - **EventSink**: receives per-block failures
//!
//! A failed block is reported and counted, then the worker moves on. Nothing a
//! single block does can stop the run.

use crate::engine::{ReadEngine, ReadOp};
use crate::output::{EventSink, WarmupEvent};
use crate::plan::sizing::round_up;
use crate::plan::BlockDescriptor;
use crate::stats::RunStats;
use crate::util::buffer::BufferPool;
use crossbeam::channel::Receiver;
use tracing::{debug, trace};

/// Outcome of reading one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The block was read up to its expected length
    Completed { bytes: u64 },
    /// The read failed or stopped short of the expected length
    Failed { error: String },
}

/// One read worker of a run
pub struct Worker<'a> {
    id: usize,
    engine: &'a dyn ReadEngine,
    pool: &'a BufferPool,
    stats: &'a RunStats,
    sink: &'a dyn EventSink,
    block_size: u64,
    alignment: u64,
}

impl<'a> Worker<'a> {
    pub fn new(
        id: usize,
        engine: &'a dyn ReadEngine,
        pool: &'a BufferPool,
        stats: &'a RunStats,
        sink: &'a dyn EventSink,
        block_size: u64,
        alignment: u64,
    ) -> Self {
        Self {
            id,
            engine,
            pool,
            stats,
            sink,
            block_size,
            alignment,
        }
    }

    /// Process blocks until the queue is closed and empty
    ///
    /// Returns the number of blocks this worker handled.
    pub fn run(&self, queue: Receiver<BlockDescriptor<'_>>) -> u64 {
        debug!(worker = self.id, engine = self.engine.name(), "worker started");
        let mut handled = 0;

        for block in queue.iter() {
            self.process(block);
            handled += 1;
        }

        debug!(worker = self.id, blocks = handled, "worker finished");
        handled
    }

    /// Read one block and record its outcome
    pub fn process(&self, block: BlockDescriptor<'_>) -> BlockOutcome {
        let outcome = self.read_block(&block);

        match &outcome {
            BlockOutcome::Completed { bytes } => {
                trace!(worker = self.id, offset = block.offset, bytes, "block warmed");
                self.stats.record_completed(*bytes);
            }
            BlockOutcome::Failed { error } => {
                self.stats.record_failed();
                self.sink.emit(WarmupEvent::BlockFailed {
                    path: block.target.path().to_path_buf(),
                    offset: block.offset,
                    error: error.clone(),
                });
            }
        }

        outcome
    }

    fn read_block(&self, block: &BlockDescriptor<'_>) -> BlockOutcome {
        let expected = block.read_len(self.block_size) as usize;

        let mut buffer = self.pool.checkout();
        let request_len = self.request_len(block, expected, buffer.size());

        let result = self.engine.read(ReadOp {
            fd: block.target.fd(),
            offset: block.offset,
            expected,
            buffer: &mut buffer.as_mut_slice()[..request_len],
        });

        match result {
            Ok(n) if n >= expected => BlockOutcome::Completed {
                bytes: expected as u64,
            },
            Ok(n) => BlockOutcome::Failed {
                error: format!("short read: {} of {} bytes before end of file", n, expected),
            },
            Err(e) => BlockOutcome::Failed {
                error: format!("{:#}", e),
            },
        }
    }

    /// Bytes to request from the kernel for a block of `expected` bytes
    ///
    /// Direct IO needs an aligned length even for the final short block; the
    /// kernel then returns only the bytes that exist.
    fn request_len(&self, block: &BlockDescriptor<'_>, expected: usize, buffer_len: usize) -> usize {
        let len = if block.target.is_direct() {
            round_up(expected as u64, self.alignment) as usize
        } else {
            expected
        };
        len.min(buffer_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::engine::sync::SyncEngine;
    use crate::output::MemorySink;
    use crate::plan::plan_file;
    use crate::target::file::FileTarget;
    use crate::target::OpenMode;
    use crossbeam::channel;
    use tempfile::TempDir;

    const KIB: u64 = 1024;

    struct Fixture {
        _dir: TempDir,
        target: FileTarget,
    }

    fn fixture(len: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![0x5Au8; len]).unwrap();
        let target = FileTarget::open(&path, OpenMode::buffered()).unwrap();
        Fixture { _dir: dir, target }
    }

    #[test]
    fn test_worker_reads_every_block() {
        let fx = fixture(10 * KIB as usize + 100);
        let engine = SyncEngine::new();
        let pool = BufferPool::new(4096, 512).unwrap();
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let worker = Worker::new(0, &engine, &pool, &stats, &sink, 4096, 512);

        let (tx, rx) = channel::unbounded();
        for block in plan_file(&fx.target, 4096) {
            tx.send(block).unwrap();
        }
        drop(tx);

        assert_eq!(worker.run(rx), 3);
        assert_eq!(stats.blocks_completed(), 3);
        assert_eq!(stats.blocks_failed(), 0);
        assert_eq!(stats.bytes_read(), 10 * KIB + 100);
        assert!(sink.events().is_empty());
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.available_count(), 1);
    }

    #[test]
    fn test_worker_failure_is_counted_and_reported() {
        let fx = fixture(8192);
        let engine = MockEngine::new();
        engine.fail_at(4096);
        let pool = BufferPool::new(4096, 512).unwrap();
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let worker = Worker::new(1, &engine, &pool, &stats, &sink, 4096, 512);

        let outcomes: Vec<_> = plan_file(&fx.target, 4096).map(|b| worker.process(b)).collect();

        assert_eq!(outcomes[0], BlockOutcome::Completed { bytes: 4096 });
        assert!(matches!(&outcomes[1], BlockOutcome::Failed { error } if error.contains("offset=4096")));
        assert_eq!(stats.blocks_completed(), 1);
        assert_eq!(stats.blocks_failed(), 1);
        assert_eq!(sink.block_failures(), 1);
        // Buffer returned on the error path too
        assert_eq!(pool.available_count(), pool.allocated_count());
    }

    #[test]
    fn test_short_read_is_a_failure() {
        let fx = fixture(4096);
        let engine = MockEngine::new();
        engine.set_bytes_per_read(100);
        let pool = BufferPool::new(4096, 512).unwrap();
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let worker = Worker::new(0, &engine, &pool, &stats, &sink, 4096, 512);

        let block = plan_file(&fx.target, 4096).next().unwrap();
        let outcome = worker.process(block);

        assert!(matches!(outcome, BlockOutcome::Failed { error } if error.contains("short read")));
        assert_eq!(stats.blocks_failed(), 1);
    }

    #[test]
    fn test_buffered_request_matches_tail_length() {
        let fx = fixture(5000);
        let engine = MockEngine::new();
        let pool = BufferPool::new(4096, 512).unwrap();
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let worker = Worker::new(0, &engine, &pool, &stats, &sink, 4096, 512);

        for block in plan_file(&fx.target, 4096) {
            worker.process(block);
        }

        let reads = engine.reads();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[1].offset, 4096);
        assert_eq!(reads[1].expected, 904);
        assert_eq!(reads[1].request_len, 904);
        assert_eq!(stats.bytes_read(), 5000);
    }

    #[test]
    fn test_direct_request_is_aligned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("direct.bin");
        std::fs::write(&path, vec![1u8; 5000]).unwrap();

        // Filesystems without O_DIRECT support (tmpfs) reject the open
        let Ok(target) = FileTarget::open(&path, OpenMode::default()) else {
            return;
        };

        let engine = MockEngine::new();
        let pool = BufferPool::new(4096, 4096).unwrap();
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let worker = Worker::new(0, &engine, &pool, &stats, &sink, 4096, 4096);

        for block in plan_file(&target, 4096) {
            worker.process(block);
        }

        let reads = engine.reads();
        assert_eq!(reads[1].expected, 904);
        assert_eq!(reads[1].request_len, 4096);
        assert!(reads.iter().all(|r| r.buffer_addr % 4096 == 0));
        assert_eq!(stats.blocks_completed(), 2);
    }
}
