//! Aligned read buffers and the pool that recycles them
//!
//! O_DIRECT requires the destination buffer to be aligned to the device's logical
//! block size. Buffers are allocated with an explicit [`Layout`] and handed out by
//! a [`BufferPool`] so the read loop never allocates once the pool is warm.

use crate::Result;
use anyhow::Context;
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Memory-aligned buffer suitable for O_DIRECT reads
///
/// The memory is zeroed on allocation, so the buffer can always be viewed as an
/// initialized byte slice.
pub struct AlignedBuffer {
    ptr: *mut u8,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate a zeroed buffer of `size` bytes aligned to `alignment`
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or `alignment` is not a power of two.
    pub fn new(size: usize, alignment: usize) -> Result<Self> {
        Ok(Self::with_layout(buffer_layout(size, alignment)?))
    }

    fn with_layout(layout: Layout) -> Self {
        // SAFETY: layout has a non-zero size (checked by buffer_layout)
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        Self { ptr, layout }
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialized bytes
        unsafe { std::slice::from_raw_parts(self.ptr, self.layout.size()) }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for layout.size() initialized bytes and uniquely borrowed
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.layout.size()) }
    }

    /// Size of the buffer in bytes
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[inline(always)]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    #[inline(always)]
    pub fn is_aligned(&self) -> bool {
        (self.ptr as usize) % self.layout.align() == 0
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with exactly this layout
        unsafe {
            dealloc(self.ptr, self.layout);
        }
    }
}

// AlignedBuffer is Send because it owns its memory
unsafe impl Send for AlignedBuffer {}

fn buffer_layout(size: usize, alignment: usize) -> Result<Layout> {
    if size == 0 {
        anyhow::bail!("buffer size must be greater than 0");
    }
    Layout::from_size_align(size, alignment)
        .with_context(|| format!("invalid buffer layout: size={}, alignment={}", size, alignment))
}

/// Thread-safe pool of equally sized aligned buffers
///
/// Buffers are allocated lazily on first checkout and reused afterwards, so a
/// run never holds more buffers than it has concurrently active readers. A
/// checked-out buffer is owned exclusively by its [`PooledBuffer`] guard and
/// returns to the pool when the guard is dropped.
pub struct BufferPool {
    free: Mutex<Vec<AlignedBuffer>>,
    layout: Layout,
    allocated: AtomicUsize,
}

impl BufferPool {
    /// Create an empty pool of `buffer_size`-byte buffers aligned to `alignment`
    ///
    /// # Errors
    ///
    /// Returns an error if the size/alignment pair is not a valid layout.
    pub fn new(buffer_size: usize, alignment: usize) -> Result<Self> {
        Ok(Self {
            free: Mutex::new(Vec::new()),
            layout: buffer_layout(buffer_size, alignment)?,
            allocated: AtomicUsize::new(0),
        })
    }

    /// Take a buffer from the pool, allocating a new one if none is free
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let reused = self.lock_free().pop();
        let buffer = reused.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            AlignedBuffer::with_layout(self.layout)
        });

        PooledBuffer {
            pool: self,
            buffer: ManuallyDrop::new(buffer),
        }
    }

    fn give_back(&self, buffer: AlignedBuffer) {
        self.lock_free().push(buffer);
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, Vec<AlignedBuffer>> {
        // The free list stays consistent even if a holder panicked mid-push
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of buffers ever allocated by this pool
    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of buffers currently idle in the pool
    pub fn available_count(&self) -> usize {
        self.lock_free().len()
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

/// Exclusive handle to a pooled buffer; returns it to the pool on drop
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: ManuallyDrop<AlignedBuffer>,
}

impl Deref for PooledBuffer<'_> {
    type Target = AlignedBuffer;

    fn deref(&self) -> &AlignedBuffer {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut AlignedBuffer {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: the buffer is taken exactly once, and self is not used afterwards
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        self.pool.give_back(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Barrier;

    #[test]
    fn test_aligned_buffer_creation() {
        let buffer = AlignedBuffer::new(4096, 512).unwrap();
        assert_eq!(buffer.size(), 4096);
        assert_eq!(buffer.alignment(), 512);
        assert!(buffer.is_aligned());
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_aligned_buffer_4k_alignment() {
        let buffer = AlignedBuffer::new(8192, 4096).unwrap();
        assert_eq!(buffer.alignment(), 4096);
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_invalid_alignment() {
        assert!(AlignedBuffer::new(4096, 513).is_err());
        assert!(BufferPool::new(4096, 3).is_err());
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(AlignedBuffer::new(0, 512).is_err());
        assert!(BufferPool::new(0, 4096).is_err());
    }

    #[test]
    fn test_pool_creation_is_lazy() {
        let pool = BufferPool::new(4096, 512).unwrap();
        assert_eq!(pool.allocated_count(), 0);
        assert_eq!(pool.available_count(), 0);
        assert_eq!(pool.buffer_size(), 4096);
        assert_eq!(pool.alignment(), 512);
    }

    #[test]
    fn test_checkout_returns_on_drop() {
        let pool = BufferPool::new(4096, 512).unwrap();

        {
            let mut buffer = pool.checkout();
            buffer.as_mut_slice()[0] = 0xAB;
            assert_eq!(pool.allocated_count(), 1);
            assert_eq!(pool.available_count(), 0);
        }

        assert_eq!(pool.available_count(), 1);

        let buffer = pool.checkout();
        assert_eq!(pool.allocated_count(), 1, "idle buffer should be reused");
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_simultaneous_checkouts_are_distinct() {
        let pool = BufferPool::new(1024, 512).unwrap();
        let a = pool.checkout();
        let b = pool.checkout();
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert_eq!(pool.allocated_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.available_count(), 2);
    }

    #[test]
    fn test_concurrent_checkout_never_shares_a_buffer() {
        const THREADS: usize = 8;
        let pool = BufferPool::new(4096, 4096).unwrap();
        let barrier = Barrier::new(THREADS);
        let seen = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let mut buffer = pool.checkout();
                    // Hold every buffer at the same time before recording
                    barrier.wait();
                    buffer.as_mut_slice()[0] = 1;
                    seen.lock().unwrap().push(buffer.as_ptr() as usize);
                    barrier.wait();
                });
            }
        });

        let addresses = seen.into_inner().unwrap();
        let unique: HashSet<_> = addresses.iter().collect();
        assert_eq!(unique.len(), THREADS);
        assert_eq!(pool.allocated_count(), THREADS);
        assert_eq!(pool.available_count(), THREADS);
    }
}
