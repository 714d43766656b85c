//! Read engine abstraction
//!
//! A read engine performs one positioned read of a block into a caller-supplied
//! buffer. Workers are agnostic to how the read is carried out, which lets tests
//! swap the real [`sync::SyncEngine`] for a [`mock::MockEngine`] that injects
//! failures and records what was requested.
//!
//! # Engine Types
//!
//! - **Synchronous**: blocking `pread` loop, the engine used for real runs
//! - **Mock**: no syscalls, configurable failures and latency (tests)
//!
//! # Example
//!
//! ```no_run
//! use blockwarm::engine::{ReadEngine, ReadOp};
//! use blockwarm::engine::sync::SyncEngine;
//! use std::os::unix::io::AsRawFd;
//!
//! let file = std::fs::File::open("/data/model.bin")?;
//! let mut buffer = vec![0u8; 4096];
//! let engine = SyncEngine::new();
//! let n = engine.read(ReadOp {
//!     fd: file.as_raw_fd(),
//!     offset: 0,
//!     expected: 4096,
//!     buffer: &mut buffer,
//! })?;
//! println!("read {} bytes", n);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::Result;
use std::os::unix::io::RawFd;

/// Positioned block reader shared by all workers of a run
///
/// # Thread Safety
///
/// Engines must be `Send + Sync`: a single instance is shared by every worker,
/// and reads on distinct buffers may run concurrently.
///
/// # Error Handling
///
/// `read` returns an error only when the underlying syscall fails. Reaching end of
/// file early is not an error; the caller compares the returned byte count with
/// [`ReadOp::expected`].
pub trait ReadEngine: Send + Sync {
    /// Read one block
    ///
    /// Reading stops once `expected` bytes have been transferred, the buffer is
    /// full, or end of file is reached. Returns the number of bytes transferred.
    ///
    /// # Errors
    ///
    /// Returns an error with the fd, offset and length in its context if the read
    /// syscall fails.
    fn read(&self, op: ReadOp<'_>) -> Result<usize>;

    /// Short engine name for logs
    fn name(&self) -> &'static str;
}

/// One block read request
///
/// For O_DIRECT targets `buffer` must start at an aligned address and its length
/// must be a multiple of the logical block size, even when `expected` is shorter
/// (the final block of a file).
#[derive(Debug)]
pub struct ReadOp<'a> {
    /// File descriptor of the target file or device
    pub fd: RawFd,

    /// Byte offset of the block
    pub offset: u64,

    /// Bytes that must be read for the block to count as warmed
    pub expected: usize,

    /// Destination; its length is the size of the request submitted to the kernel
    pub buffer: &'a mut [u8],
}

pub mod mock;
pub mod sync;
