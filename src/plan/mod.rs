//! Block planning
//!
//! Splits a file into fixed-size blocks. Block `i` starts at `i * block_size`; only
//! the last block of a file may be shorter than the nominal size. Lengths are never
//! materialized per block: the worker derives them with [`BlockLayout::read_len`].
//!
//! # Example
//!
//! ```
//! use blockwarm::plan::BlockLayout;
//!
//! let layout = BlockLayout::new(2_621_440, 1_048_576); // 2.5 MiB in 1 MiB blocks
//! assert_eq!(layout.block_count(), 3);
//! assert_eq!(layout.read_len(2 * 1_048_576), 524_288);
//! ```

pub mod advisor;
pub mod sizing;

use crate::target::file::FileTarget;

/// Block partitioning of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    file_len: u64,
    block_size: u64,
}

impl BlockLayout {
    /// Create a layout for a file of `file_len` bytes
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is zero. Configuration validation rejects that
    /// before a layout is ever built.
    pub fn new(file_len: u64, block_size: u64) -> Self {
        assert!(block_size > 0, "block size must be greater than 0");
        Self { file_len, block_size }
    }

    /// Number of blocks, `ceil(file_len / block_size)`
    #[inline]
    pub fn block_count(&self) -> u64 {
        self.file_len.div_ceil(self.block_size)
    }

    /// Byte offset of block `index`
    #[inline]
    pub fn offset_of(&self, index: u64) -> u64 {
        index * self.block_size
    }

    /// Number of bytes a read at `offset` must cover
    ///
    /// Returns 0 for offsets at or past the end of the file.
    #[inline]
    pub fn read_len(&self, offset: u64) -> u64 {
        self.block_size.min(self.file_len.saturating_sub(offset))
    }

    /// Iterate over all block offsets in ascending order
    pub fn offsets(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.block_count()).map(move |i| self.offset_of(i))
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }
}

/// One unit of read work: a block of an open target
///
/// Borrowed from the run's targets, so a descriptor cannot outlive the handle it
/// reads from.
#[derive(Debug, Clone, Copy)]
pub struct BlockDescriptor<'a> {
    pub target: &'a FileTarget,
    pub offset: u64,
}

impl<'a> BlockDescriptor<'a> {
    /// Bytes this block must cover for the given nominal block size
    #[inline]
    pub fn read_len(&self, block_size: u64) -> u64 {
        BlockLayout::new(self.target.size(), block_size).read_len(self.offset)
    }
}

/// Produce every descriptor of `target` in block order
pub fn plan_file(target: &FileTarget, block_size: u64) -> impl Iterator<Item = BlockDescriptor<'_>> {
    let layout = BlockLayout::new(target.size(), block_size);
    (0..layout.block_count()).map(move |i| BlockDescriptor {
        target,
        offset: layout.offset_of(i),
    })
}
