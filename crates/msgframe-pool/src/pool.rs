use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::{PoolConfig, PoolStrategy};
use crate::error::Result;

/// Thread-safe recycler of byte buffers, bucketed by power-of-two size class.
///
/// `BufferPool` is a cheap handle: clones share the same free lists. Every
/// size class has its own lock, so takers of different sizes never contend.
///
/// A buffer handed out by [`take`](BufferPool::take) belongs exclusively to
/// the caller until it is passed back to [`give`](BufferPool::give). After
/// `give` the caller must not keep any view of it.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

/// Point-in-time counters for a [`BufferPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolStats {
    /// Total `take` calls.
    pub takes: u64,
    /// Takes served from a free list.
    pub reuses: u64,
    /// Takes served by a fresh allocation.
    pub fresh_allocations: u64,
    /// Total `give` calls.
    pub gives: u64,
    /// Given buffers dropped instead of retained.
    pub discarded: u64,
    /// Buffers currently idle in the free lists.
    pub idle_buffers: usize,
    /// Combined capacity of the idle buffers.
    pub idle_bytes: usize,
}

impl PoolStats {
    /// Buffers taken and not yet given back.
    pub fn outstanding(&self) -> u64 {
        self.takes.saturating_sub(self.gives)
    }
}

impl BufferPool {
    /// Create a pool with default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(PoolConfig::default())
    }

    /// Create a pool with explicit configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// Create a pool that allocates on every take and never retains buffers.
    pub fn unpooled() -> Self {
        Self::from_valid_config(PoolConfig::unpooled())
    }

    fn from_valid_config(config: PoolConfig) -> Self {
        let classes = match config.strategy {
            PoolStrategy::Pooled => (0..config.class_count())
                .map(|_| Mutex::new(Vec::new()))
                .collect(),
            PoolStrategy::Unpooled => Vec::new(),
        };
        Self {
            inner: Arc::new(PoolInner {
                config,
                classes,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// Take an empty buffer whose capacity is at least `size`.
    ///
    /// Never fails: when no idle buffer of the matching class exists, a fresh
    /// one is allocated.
    pub fn take(&self, size: usize) -> BytesMut {
        let inner = &self.inner;
        inner.metrics.takes.fetch_add(1, Ordering::Relaxed);

        let Some(class) = inner.class_for_request(size) else {
            inner.metrics.fresh_allocations.fetch_add(1, Ordering::Relaxed);
            trace!(size, "allocating unpooled buffer");
            return BytesMut::with_capacity(size);
        };

        let reused = inner.classes[class].lock().pop();
        match reused {
            Some(buffer) => {
                inner.metrics.reuses.fetch_add(1, Ordering::Relaxed);
                inner.metrics.release_idle(buffer.capacity());
                trace!(size, capacity = buffer.capacity(), "reusing pooled buffer");
                buffer
            }
            None => {
                inner.metrics.fresh_allocations.fetch_add(1, Ordering::Relaxed);
                let capacity = inner.class_capacity(class);
                trace!(size, capacity, "allocating buffer for size class");
                BytesMut::with_capacity(capacity)
            }
        }
    }

    /// Return a buffer for future takes.
    ///
    /// The buffer is cleared. Buffers outside the pooled size classes, or
    /// beyond the retention limits, are dropped.
    pub fn give(&self, mut buffer: BytesMut) {
        let inner = &self.inner;
        inner.metrics.gives.fetch_add(1, Ordering::Relaxed);
        buffer.clear();
        let capacity = buffer.capacity();

        let Some(class) = inner.class_for_return(capacity) else {
            inner.discard(capacity, "outside pooled size classes");
            return;
        };

        if !inner.metrics.reserve_idle(capacity, inner.config.max_pooled_bytes) {
            inner.discard(capacity, "idle byte limit reached");
            return;
        }

        let mut list = inner.classes[class].lock();
        if list.len() >= inner.config.max_buffers_per_class {
            drop(list);
            inner.metrics.release_idle(capacity);
            inner.discard(capacity, "size class full");
            return;
        }
        list.push(buffer);
        trace!(capacity, "buffer returned to pool");
    }

    /// Drop every idle buffer. Returns the capacity released, in bytes.
    pub fn shrink(&self) -> usize {
        let mut released = 0usize;
        for class in &self.inner.classes {
            let drained: Vec<BytesMut> = class.lock().drain(..).collect();
            released += drained.iter().map(BytesMut::capacity).sum::<usize>();
        }
        self.inner.metrics.release_idle(released);
        debug!(released, "shrunk buffer pool");
        released
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let metrics = &self.inner.metrics;
        let idle_buffers = self.inner.classes.iter().map(|c| c.lock().len()).sum();
        PoolStats {
            takes: metrics.takes.load(Ordering::Relaxed),
            reuses: metrics.reuses.load(Ordering::Relaxed),
            fresh_allocations: metrics.fresh_allocations.load(Ordering::Relaxed),
            gives: metrics.gives.load(Ordering::Relaxed),
            discarded: metrics.discarded.load(Ordering::Relaxed),
            idle_buffers,
            idle_bytes: metrics.idle_bytes.load(Ordering::Relaxed),
        }
    }

    /// Capacity a `take(size)` would be served with, or `None` when the
    /// request bypasses the size classes.
    pub fn class_size(&self, size: usize) -> Option<usize> {
        self.inner
            .class_for_request(size)
            .map(|class| self.inner.class_capacity(class))
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

struct PoolInner {
    config: PoolConfig,
    classes: Vec<Mutex<Vec<BytesMut>>>,
    metrics: PoolMetrics,
}

impl PoolInner {
    /// Smallest class whose capacity covers `size`.
    fn class_for_request(&self, size: usize) -> Option<usize> {
        if self.classes.is_empty() {
            return None;
        }
        let wanted = size.max(self.config.min_buffer_size);
        if wanted > self.config.max_buffer_size {
            return None;
        }
        Some(self.class_index(wanted.next_power_of_two()))
    }

    /// Largest class whose capacity the buffer still covers.
    fn class_for_return(&self, capacity: usize) -> Option<usize> {
        if self.classes.is_empty()
            || capacity < self.config.min_buffer_size
            || capacity > self.config.max_buffer_size
        {
            return None;
        }
        let floor = 1usize << (usize::BITS - 1 - capacity.leading_zeros());
        Some(self.class_index(floor))
    }

    fn class_index(&self, power_of_two: usize) -> usize {
        (power_of_two.trailing_zeros() - self.config.min_buffer_size.trailing_zeros()) as usize
    }

    fn class_capacity(&self, class: usize) -> usize {
        self.config.min_buffer_size << class
    }

    fn discard(&self, capacity: usize, reason: &'static str) {
        self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
        if self.config.strategy == PoolStrategy::Pooled {
            debug!(capacity, reason, "discarding buffer instead of pooling");
        }
    }
}

#[derive(Default)]
struct PoolMetrics {
    takes: AtomicU64,
    reuses: AtomicU64,
    fresh_allocations: AtomicU64,
    gives: AtomicU64,
    discarded: AtomicU64,
    idle_bytes: AtomicUsize,
}

impl PoolMetrics {
    /// Account `capacity` idle bytes unless that would exceed `limit`.
    fn reserve_idle(&self, capacity: usize, limit: usize) -> bool {
        self.idle_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current
                    .checked_add(capacity)
                    .filter(|total| *total <= limit)
            })
            .is_ok()
    }

    fn release_idle(&self, capacity: usize) {
        let _ = self
            .idle_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(capacity))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> BufferPool {
        BufferPool::with_config(PoolConfig {
            min_buffer_size: 16,
            max_buffer_size: 1024,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn take_rounds_up_to_size_class() {
        let pool = small_pool();
        let buf = pool.take(100);
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 128);
        assert_eq!(pool.class_size(100), Some(128));
        assert_eq!(pool.class_size(0), Some(16));
        assert_eq!(pool.class_size(1024), Some(1024));
        assert_eq!(pool.class_size(1025), None);
    }

    #[test]
    fn given_buffer_is_reused() {
        let pool = small_pool();
        let mut buf = pool.take(64);
        buf.extend_from_slice(b"stale");
        pool.give(buf);

        let stats = pool.stats();
        assert_eq!(stats.idle_buffers, 1);
        assert_eq!(stats.idle_bytes, 64);

        let again = pool.take(50);
        assert!(again.is_empty(), "returned buffers must be cleared");
        assert!(again.capacity() >= 50);

        let stats = pool.stats();
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.fresh_allocations, 1);
        assert_eq!(stats.idle_buffers, 0);
        assert_eq!(stats.idle_bytes, 0);
        assert_eq!(stats.outstanding(), 1);
    }

    #[test]
    fn different_class_is_not_reused() {
        let pool = small_pool();
        pool.give(pool.take(16));
        let big = pool.take(512);
        assert!(big.capacity() >= 512);
        assert_eq!(pool.stats().reuses, 0);
        assert_eq!(pool.stats().idle_buffers, 1);
    }

    #[test]
    fn oversize_requests_bypass_the_pool() {
        let pool = small_pool();
        let buf = pool.take(4096);
        assert!(buf.capacity() >= 4096);
        pool.give(buf);

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.idle_buffers, 0);
    }

    #[test]
    fn foreign_small_buffer_is_dropped() {
        let pool = small_pool();
        pool.give(BytesMut::with_capacity(4));
        assert_eq!(pool.stats().discarded, 1);
        assert_eq!(pool.stats().idle_buffers, 0);
    }

    #[test]
    fn oddly_sized_buffer_lands_in_floor_class() {
        let pool = small_pool();
        pool.give(BytesMut::with_capacity(200));
        // 200 bytes cover the 128 class but not the 256 class.
        assert_eq!(pool.stats().idle_buffers, 1);
        let reused = pool.take(128);
        assert!(reused.capacity() >= 128);
        assert_eq!(pool.stats().reuses, 1);
    }

    #[test]
    fn per_class_limit_is_enforced() {
        let pool = BufferPool::with_config(PoolConfig {
            min_buffer_size: 16,
            max_buffer_size: 64,
            max_buffers_per_class: 2,
            ..PoolConfig::default()
        })
        .unwrap();

        let bufs: Vec<_> = (0..3).map(|_| pool.take(16)).collect();
        for buf in bufs {
            pool.give(buf);
        }

        let stats = pool.stats();
        assert_eq!(stats.idle_buffers, 2);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.idle_bytes, 32);
    }

    #[test]
    fn idle_byte_limit_is_enforced() {
        let pool = BufferPool::with_config(PoolConfig {
            min_buffer_size: 16,
            max_buffer_size: 64,
            max_pooled_bytes: 100,
            ..PoolConfig::default()
        })
        .unwrap();

        let bufs: Vec<_> = (0..3).map(|_| pool.take(64)).collect();
        for buf in bufs {
            pool.give(buf);
        }

        let stats = pool.stats();
        assert_eq!(stats.idle_buffers, 1);
        assert_eq!(stats.idle_bytes, 64);
        assert_eq!(stats.discarded, 2);
    }

    #[test]
    fn unpooled_strategy_never_reuses() {
        let pool = BufferPool::unpooled();
        for _ in 0..4 {
            let buf = pool.take(32);
            assert!(buf.capacity() >= 32);
            pool.give(buf);
        }

        let stats = pool.stats();
        assert_eq!(stats.takes, 4);
        assert_eq!(stats.reuses, 0);
        assert_eq!(stats.fresh_allocations, 4);
        assert_eq!(stats.discarded, 4);
        assert_eq!(stats.idle_buffers, 0);
        assert_eq!(pool.class_size(32), None);
    }

    #[test]
    fn shrink_releases_idle_buffers() {
        let pool = small_pool();
        let a = pool.take(16);
        let b = pool.take(256);
        pool.give(a);
        pool.give(b);

        assert_eq!(pool.shrink(), 16 + 256);
        let stats = pool.stats();
        assert_eq!(stats.idle_buffers, 0);
        assert_eq!(stats.idle_bytes, 0);
    }

    #[test]
    fn clones_share_free_lists() {
        let pool = small_pool();
        let other = pool.clone();
        other.give(pool.take(32));
        assert_eq!(pool.stats().idle_buffers, 1);
        let _ = pool.take(32);
        assert_eq!(other.stats().reuses, 1);
    }

    #[test]
    fn with_config_rejects_invalid() {
        let err = BufferPool::with_config(PoolConfig {
            min_buffer_size: 3,
            ..PoolConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, crate::PoolError::InvalidConfig(_)));
    }
}
