//! blockwarm - pre-warm files on block storage
//!
//! blockwarm reads every block of a set of large files so the storage layer
//! underneath (network block devices, lazily hydrated cloud volumes, tiered
//! arrays) fetches them ahead of first use, without filling the host's page
//! cache with the data.
//!
//! # Architecture
//!
//! - **Direct reads**: targets are opened with `O_DIRECT` into aligned buffers
//! - **Cache drop**: `posix_fadvise(DONTNEED)` before and after the run
//! - **Bounded worker pool**: scoped threads on a bounded block queue
//! - **Buffer pool**: aligned buffers reused across blocks
//! - **Adaptive sizing**: block size and worker count from the device's physical sector size
//! - **Live stats**: periodic throughput samples and a final report

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod output;
pub mod plan;
pub mod stats;
pub mod target;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{warm_files, Warmup};
pub use error::WarmupError;
pub use output::WarmupReport;

/// Result type used throughout blockwarm
pub type Result<T> = anyhow::Result<T>;
