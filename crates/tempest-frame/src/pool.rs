//! The process-wide send-buffer pool (spec.md §4.D step 1, §5): a bounded
//! stack of reusable byte buffers so encoding a frame does not allocate on
//! the hot path. Default capacity is `10 * cpu-count`, `1 KiB` buffers,
//! grown on demand and zeroed on release.

use std::sync::Mutex;

/// Initial capacity handed to a freshly-allocated buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// A bounded stack of reusable `Vec<u8>` buffers (spec.md §5's "process-wide
/// send-buffer pool... safe for concurrent readers; writers use lock-free
/// stacks/maps where hot, and locks elsewhere" — a plain `Mutex<Vec<_>>` is
/// the locked case this pool falls into, since checkout/release is already
/// off the per-message hot path of encode/decode itself).
pub struct BufferPool {
    slots: Mutex<Vec<Vec<u8>>>,
    limit: usize,
    buffer_size: usize,
}

impl BufferPool {
    /// Builds a pool bounded at `limit` buffers, each pre-allocated to
    /// `buffer_size` bytes.
    #[must_use]
    pub fn new(limit: usize, buffer_size: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(limit)),
            limit,
            buffer_size,
        }
    }

    /// Builds a pool using [`tempest_core::TempestConfig::buffer_pool_limit`]
    /// and [`DEFAULT_BUFFER_SIZE`].
    #[must_use]
    pub fn from_config(config: &tempest_core::TempestConfig) -> Self {
        Self::new(config.buffer_pool_limit(), DEFAULT_BUFFER_SIZE)
    }

    /// Checks out a buffer, reusing a pooled one if available or
    /// allocating a fresh one sized to [`DEFAULT_BUFFER_SIZE`] otherwise.
    pub fn checkout(&self) -> Vec<u8> {
        let mut slots = self.slots.lock().expect("buffer pool lock poisoned");
        slots.pop().unwrap_or_else(|| Vec::with_capacity(self.buffer_size))
    }

    /// Returns a buffer to the pool, clearing its contents first. Dropped
    /// (not retained) if the pool is already at capacity.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        let mut slots = self.slots.lock().expect("buffer pool lock poisoned");
        if slots.len() < self.limit {
            slots.push(buffer);
        }
    }

    /// Number of buffers currently parked in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().expect("buffer pool lock poisoned").len()
    }

    /// Whether the pool currently holds no parked buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_reuses_released_buffers() {
        let pool = BufferPool::new(2, 64);
        let mut buf = pool.checkout();
        buf.extend_from_slice(b"hello");
        pool.release(buf);
        assert_eq!(pool.len(), 1);
        let reused = pool.checkout();
        assert!(reused.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn release_past_limit_is_dropped() {
        let pool = BufferPool::new(1, 64);
        pool.release(vec![1, 2, 3]);
        pool.release(vec![4, 5, 6]);
        assert_eq!(pool.len(), 1);
    }
}
