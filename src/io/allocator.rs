//! Sharded Byte-Buffer Allocator
//!
//! This module provides the zero-garbage buffer lifecycle used by the
//! decode and encode paths. Buffers are pooled in power-of-two size
//! classes, one lock-free free list per class, so the hot path never
//! touches the global allocator for the small ephemeral buffers that
//! dominate DNS workloads (typically 12–1500 bytes).
//!
//! # Architecture
//!
//! ```text
//! get(n)                          release(buf)
//!    |                                |
//!    v                                v
//! shard(n) = ceil(log2 n)       capacity check
//!    |                                |
//!    v                                v
//! class free list (ArrayQueue) <── exact power of two?
//!    |                                |  no -> panic (foreign buffer)
//!    v                                |  0 or > 2^K -> silently dropped
//! pop, or allocate 2^shard(n)   push back to class free list
//! ```
//!
//! # Correctness contract
//!
//! Every buffer handed back must have been issued by the allocator. The
//! capacity check is the only way to detect a foreign buffer before it
//! corrupts a free list, so a capacity that is in the pooled range but not
//! an exact power of two panics instead of returning an error.
//!
//! # Example
//!
//! ```
//! use dns_dispatcher::io::Allocator;
//!
//! let alloc = Allocator::new(12); // classes up to 4096 bytes
//!
//! let buf = alloc.get(1200);
//! assert_eq!(buf.len(), 1200);
//! assert_eq!(buf.capacity(), 2048);
//!
//! alloc.release(buf);
//! assert!(alloc.stats().returns() >= 1);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

/// Default maximum size-class exponent (2^16 = 64 KiB, the largest DNS
/// message a transport can frame)
pub const DEFAULT_MAX_POOLED_EXP: u32 = 16;

/// Buffers retained per size class; a release into a full class drops the
/// buffer instead of blocking
const CLASS_CAPACITY: usize = 256;

/// Map a requested size to its size-class exponent.
///
/// Returns the smallest `c` such that `2^c >= size`; sizes of 0 and 1 both
/// map to class 0.
#[must_use]
pub(crate) fn shard(size: usize) -> u32 {
    if size <= 1 {
        0
    } else {
        usize::BITS - (size - 1).leading_zeros()
    }
}

/// Statistics for the allocator
#[derive(Debug, Default)]
pub struct AllocatorStats {
    /// Number of new buffer allocations (class free list was empty, or the
    /// request bypassed the pool)
    allocations: AtomicU64,
    /// Number of buffer reuses from a class free list
    reuses: AtomicU64,
    /// Number of buffers returned to a free list
    returns: AtomicU64,
    /// Number of buffers dropped on release (class free list was full)
    drops: AtomicU64,
    /// Number of releases ignored (capacity zero or above the pooled range)
    ignored: AtomicU64,
}

impl AllocatorStats {
    /// Get the number of allocations
    #[must_use]
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Get the number of reuses
    #[must_use]
    pub fn reuses(&self) -> u64 {
        self.reuses.load(Ordering::Relaxed)
    }

    /// Get the number of returns
    #[must_use]
    pub fn returns(&self) -> u64 {
        self.returns.load(Ordering::Relaxed)
    }

    /// Get the number of buffers dropped because their class was full
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Get the number of ignored releases
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Get pool efficiency (reuses / (reuses + allocations))
    ///
    /// Returns 0.0 if no operations have occurred.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn efficiency(&self) -> f64 {
        let reuses = self.reuses();
        let total = reuses + self.allocations();
        if total == 0 {
            0.0
        } else {
            reuses as f64 / total as f64
        }
    }

    /// Get a snapshot of all stats
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStatsSnapshot {
        AllocatorStatsSnapshot {
            allocations: self.allocations(),
            reuses: self.reuses(),
            returns: self.returns(),
            drops: self.drops(),
            ignored: self.ignored(),
        }
    }
}

/// Snapshot of allocator statistics
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStatsSnapshot {
    /// Number of new buffer allocations
    pub allocations: u64,
    /// Number of buffer reuses
    pub reuses: u64,
    /// Number of buffers returned
    pub returns: u64,
    /// Number of buffers dropped (class full)
    pub drops: u64,
    /// Number of ignored releases
    pub ignored: u64,
}

/// A sharded power-of-two byte-buffer pool.
///
/// Manages size classes `0..=max_exp` covering capacities 1 through
/// `2^max_exp`. Each class has its own lock-free free list; there is no
/// global lock.
#[derive(Debug)]
pub struct Allocator {
    /// One free list per size class, index = exponent
    classes: Vec<ArrayQueue<Vec<u8>>>,
    /// Maximum size-class exponent (K)
    max_exp: u32,
    /// Allocator statistics
    stats: AllocatorStats,
}

impl Allocator {
    /// Create an allocator managing size classes up to `2^max_exp` bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use dns_dispatcher::io::Allocator;
    ///
    /// // Classes 1, 2, 4, ..., 256 bytes
    /// let alloc = Allocator::new(8);
    /// assert_eq!(alloc.max_size(), 256);
    /// ```
    #[must_use]
    pub fn new(max_exp: u32) -> Self {
        let classes = (0..=max_exp)
            .map(|_| ArrayQueue::new(CLASS_CAPACITY))
            .collect();
        Self {
            classes,
            max_exp,
            stats: AllocatorStats::default(),
        }
    }

    /// The largest pooled capacity (`2^K`)
    #[must_use]
    pub fn max_size(&self) -> usize {
        1 << self.max_exp
    }

    /// Get a buffer with length `size`.
    ///
    /// - `size == 0` returns a fresh empty buffer (not pooled).
    /// - `size > 2^K` returns a freshly allocated buffer with
    ///   `capacity == len == size`, bypassing the pool.
    /// - Otherwise the buffer comes from the `shard(size)` free list (or a
    ///   new `2^shard(size)`-capacity allocation) with its length set to
    ///   `size` and the prefix zero-filled.
    #[must_use]
    pub fn get(&self, size: usize) -> Vec<u8> {
        if size == 0 {
            return Vec::new();
        }
        if size > self.max_size() {
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
            return vec![0u8; size];
        }

        let class = shard(size) as usize;
        if let Some(mut buf) = self.classes[class].pop() {
            self.stats.reuses.fetch_add(1, Ordering::Relaxed);
            debug_assert_eq!(buf.capacity(), 1 << class);
            // Released buffers arrive cleared, so this fills 0..size
            // without reallocating. A plain set_len would be unsound
            // here: release accepts any power-of-two-capacity buffer,
            // including ones with an uninitialized tail.
            buf.resize(size, 0);
            buf
        } else {
            self.stats.allocations.fetch_add(1, Ordering::Relaxed);
            let mut buf = vec![0u8; 1 << class];
            buf.truncate(size);
            buf
        }
    }

    /// Get a buffer wrapped in an RAII handle that releases on drop.
    ///
    /// This is the form used on the encode path, where the buffer must be
    /// returned on every exit.
    #[must_use]
    pub fn get_pooled(self: &Arc<Self>, size: usize) -> PooledBuf {
        PooledBuf {
            buf: Some(self.get(size)),
            alloc: Arc::clone(self),
        }
    }

    /// Return a buffer to its size-class free list.
    ///
    /// A capacity of 0 or above `2^K` is silently ignored; callers may pool
    /// heterogeneous buffers without pre-checks. If the class free list is
    /// full the buffer is dropped and counted.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is within the pooled range but not an exact
    /// power of two: the buffer was not issued by this allocator, and
    /// pooling it would corrupt the free list.
    pub fn release(&self, mut buf: Vec<u8>) {
        let cap = buf.capacity();
        if cap == 0 || cap > self.max_size() {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }
        assert!(
            cap.is_power_of_two(),
            "released buffer was not issued by this allocator (capacity {cap})"
        );

        buf.clear();
        let class = cap.trailing_zeros() as usize;
        match self.classes[class].push(buf) {
            Ok(()) => {
                self.stats.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_full) => {
                self.stats.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of buffers currently idle in the given class
    #[must_use]
    pub fn available(&self, class: u32) -> usize {
        self.classes
            .get(class as usize)
            .map_or(0, ArrayQueue::len)
    }

    /// Get allocator statistics
    #[must_use]
    pub fn stats(&self) -> &AllocatorStats {
        &self.stats
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED_EXP)
    }
}

/// A buffer borrowed from an [`Allocator`].
///
/// Dereferences to the valid prefix and releases the underlying buffer,
/// with its original capacity, when dropped. Dropping the handle is the
/// release; there is no separate call to forget.
#[derive(Debug)]
pub struct PooledBuf {
    /// The underlying buffer (Option for taking on drop)
    buf: Option<Vec<u8>>,
    /// The allocator the buffer returns to
    alloc: Arc<Allocator>,
}

impl PooledBuf {
    pub(crate) fn from_parts(buf: Vec<u8>, alloc: Arc<Allocator>) -> Self {
        Self {
            buf: Some(buf),
            alloc,
        }
    }

    /// Length of the valid prefix
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::len)
    }

    /// Whether the valid prefix is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the underlying buffer
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::capacity)
    }

    /// Consume the handle without returning the buffer to the pool.
    #[must_use]
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.take().unwrap_or_default()
    }

    /// Freeze the valid prefix into a `Bytes` instance.
    ///
    /// Zero-copy: the underlying memory is transferred to the `Bytes`
    /// without allocation. The buffer is not returned to the pool; the
    /// memory is freed when the `Bytes` drops.
    #[must_use]
    pub fn freeze(mut self) -> bytes::Bytes {
        bytes::Bytes::from(self.buf.take().unwrap_or_default())
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.alloc.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_table() {
        // Negative sizes are unrepresentable: `size` is a usize, so the
        // reference's "abort on negative" row is a compile-time guarantee.
        let table = [
            (0, 0),
            (1, 0),
            (2, 1),
            (3, 2),
            (4, 2),
            (5, 3),
            (8, 3),
            (1023, 10),
            (1024, 10),
            (1025, 11),
        ];
        for (size, want) in table {
            assert_eq!(shard(size), want, "shard({size})");
        }
    }

    #[test]
    fn test_get_pooled_range() {
        let alloc = Allocator::new(8); // 256 bytes
        for _ in 0..500 {
            let buf = alloc.get(12);
            assert_eq!(buf.len(), 12);
            assert_eq!(buf.capacity(), 16);
            alloc.release(buf);
        }
        // One allocation, then steady reuse of the same class-4 buffer
        assert_eq!(alloc.stats().allocations(), 1);
        assert_eq!(alloc.stats().reuses(), 499);
    }

    #[test]
    fn test_get_exact_class_size() {
        let alloc = Allocator::new(8);
        for _ in 0..500 {
            let buf = alloc.get(256);
            assert_eq!(buf.len(), 256);
            assert_eq!(buf.capacity(), 256);
            alloc.release(buf);
        }
    }

    #[test]
    fn test_get_zero() {
        let alloc = Allocator::new(8);
        let buf = alloc.get(0);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn test_get_oversize_bypasses_pool() {
        let alloc = Allocator::new(8);
        for _ in 0..500 {
            let buf = alloc.get(257);
            assert_eq!(buf.len(), 257);
            assert_eq!(buf.capacity(), 257);
            // Oversize capacity: ignored on release, never pooled
            alloc.release(buf);
        }
        assert_eq!(alloc.stats().returns(), 0);
        assert_eq!(alloc.stats().ignored(), 500);
    }

    #[test]
    fn test_release_zero_capacity_ignored() {
        let alloc = Allocator::new(8);
        alloc.release(Vec::new());
        assert_eq!(alloc.stats().ignored(), 1);
    }

    #[test]
    #[should_panic(expected = "not issued by this allocator")]
    fn test_release_foreign_capacity_panics() {
        let alloc = Allocator::new(8);
        // 254 is inside the pooled range but not a power of two, so it
        // cannot have come from a class free list.
        alloc.release(Vec::with_capacity(254));
    }

    #[test]
    fn test_release_full_class_drops() {
        let alloc = Allocator::new(4);
        for _ in 0..(CLASS_CAPACITY + 10) {
            alloc.release(vec![0u8; 8]);
        }
        assert_eq!(alloc.stats().returns() as usize, CLASS_CAPACITY);
        assert_eq!(alloc.stats().drops(), 10);
    }

    #[test]
    fn test_classes_are_independent() {
        let alloc = Allocator::new(8);
        let small = alloc.get(3);
        let large = alloc.get(200);
        alloc.release(small);
        alloc.release(large);
        assert_eq!(alloc.available(2), 1);
        assert_eq!(alloc.available(8), 1);

        let buf = alloc.get(4);
        assert_eq!(buf.capacity(), 4);
        assert_eq!(alloc.available(2), 0);
        assert_eq!(alloc.available(8), 1);
    }

    #[test]
    fn test_pooled_buf_releases_on_drop() {
        let alloc = Arc::new(Allocator::new(8));
        {
            let buf = alloc.get_pooled(100);
            assert_eq!(buf.len(), 100);
            assert_eq!(buf.capacity(), 128);
        }
        assert_eq!(alloc.stats().returns(), 1);
        assert_eq!(alloc.available(7), 1);
    }

    #[test]
    fn test_pooled_buf_into_vec_skips_release() {
        let alloc = Arc::new(Allocator::new(8));
        let buf = alloc.get_pooled(100);
        let v = buf.into_vec();
        assert_eq!(v.len(), 100);
        assert_eq!(alloc.stats().returns(), 0);
    }

    #[test]
    fn test_pooled_buf_freeze() {
        let alloc = Arc::new(Allocator::new(8));
        let mut buf = alloc.get_pooled(4);
        buf[0] = 42;
        let bytes = buf.freeze();
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0], 42);
        assert_eq!(alloc.stats().returns(), 0);
    }

    #[test]
    fn test_concurrent_get_release() {
        let alloc = Arc::new(Allocator::new(10));
        let mut handles = Vec::new();
        for t in 0..4 {
            let alloc = Arc::clone(&alloc);
            handles.push(std::thread::spawn(move || {
                for i in 0..1000 {
                    let size = 1 + (t * 251 + i * 7) % 1024;
                    let buf = alloc.get(size);
                    assert_eq!(buf.len(), size);
                    assert!(buf.capacity().is_power_of_two());
                    assert!(buf.capacity() >= size);
                    alloc.release(buf);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let stats = alloc.stats().snapshot();
        assert_eq!(stats.returns + stats.drops, 4000);
    }

    #[test]
    fn test_efficiency() {
        let alloc = Allocator::new(8);
        assert_eq!(alloc.stats().efficiency(), 0.0);

        let buf = alloc.get(64);
        alloc.release(buf);
        let _buf = alloc.get(64);
        assert!((alloc.stats().efficiency() - 0.5).abs() < 0.001);
    }
}
