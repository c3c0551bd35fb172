//! Reusable byte buffers for cache stream I/O
//!
//! The cache borrows buffers for the lifetime of a buffered read or write and
//! hands them back when the stream is dropped. `SharedBufferPool` keeps the
//! free list in a bounded crossbeam channel so any thread can return a buffer
//! without taking a lock.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Default size of a pooled buffer (8KB)
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Default number of idle buffers kept by [`SharedBufferPool`]
pub const DEFAULT_POOL_CAPACITY: usize = 32;

/// Source of reusable byte buffers.
///
/// Implementations must be shareable across threads; the cache never holds a
/// buffer longer than one stream operation.
pub trait BufferPool: Send + Sync + fmt::Debug {
    /// Returns a buffer whose length is at least `min_size`.
    fn acquire(&self, min_size: usize) -> Vec<u8>;

    /// Gives a buffer back to the pool.
    fn release(&self, buffer: Vec<u8>);

    /// Preferred buffer size for streams that do not ask for a specific one.
    fn buffer_size(&self) -> usize {
        DEFAULT_BUFFER_SIZE
    }
}

/// Buffer borrowed from a [`BufferPool`], released on drop.
pub struct PooledBuffer {
    buffer: Option<Vec<u8>>,
    pool: Arc<dyn BufferPool>,
}

impl PooledBuffer {
    /// Borrow a buffer of at least `min_size` bytes from `pool`.
    pub fn acquire(pool: &Arc<dyn BufferPool>, min_size: usize) -> Self {
        let buffer = pool.acquire(min_size);
        Self {
            buffer: Some(buffer),
            pool: Arc::clone(pool),
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.len()).finish()
    }
}

/// Lock-free buffer pool backed by a bounded channel of idle buffers
#[derive(Debug)]
pub struct SharedBufferPool {
    idle_tx: Sender<Vec<u8>>,
    idle_rx: Receiver<Vec<u8>>,
    buffer_size: usize,
    /// Buffers created because no idle buffer was large enough
    allocated: AtomicU64,
    /// Buffers served from the idle list
    reused: AtomicU64,
}

impl SharedBufferPool {
    /// Create a pool keeping at most `capacity` idle buffers of `buffer_size` bytes.
    #[must_use]
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        let (idle_tx, idle_rx) = crossbeam_channel::bounded(capacity.max(1));
        Self {
            idle_tx,
            idle_rx,
            buffer_size: buffer_size.max(1),
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Create a pool with the default capacity and the given buffer size.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, buffer_size)
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    /// Number of buffers allocated since creation.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of acquisitions served by an idle buffer.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Default for SharedBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY, DEFAULT_BUFFER_SIZE)
    }
}

impl BufferPool for SharedBufferPool {
    fn acquire(&self, min_size: usize) -> Vec<u8> {
        // Undersized idle buffers are dropped rather than grown.
        while let Ok(buffer) = self.idle_rx.try_recv() {
            if buffer.len() >= min_size {
                self.reused.fetch_add(1, Ordering::Relaxed);
                return buffer;
            }
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        vec![0; min_size.max(self.buffer_size)]
    }

    fn release(&self, buffer: Vec<u8>) {
        if buffer.is_empty() {
            return;
        }
        // A full free list simply drops the buffer.
        if let Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) =
            self.idle_tx.try_send(buffer)
        {
            tracing::trace!(target: "respcache::io", "buffer pool full, dropping buffer");
        }
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_are_reused() {
        let pool = SharedBufferPool::new(4, 1024);
        let buffer = pool.acquire(512);
        assert_eq!(buffer.len(), 1024);
        pool.release(buffer);
        assert_eq!(pool.idle(), 1);

        let again = pool.acquire(1024);
        assert_eq!(again.len(), 1024);
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.reused(), 1);
    }

    #[test]
    fn undersized_idle_buffers_are_replaced() {
        let pool = SharedBufferPool::new(4, 16);
        pool.release(vec![0; 16]);
        let buffer = pool.acquire(64);
        assert_eq!(buffer.len(), 64);
        assert_eq!(pool.reused(), 0);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn pool_never_grows_past_capacity() {
        let pool = SharedBufferPool::new(2, 16);
        for _ in 0..5 {
            pool.release(vec![0; 16]);
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn pooled_buffer_returns_on_drop() {
        let shared = Arc::new(SharedBufferPool::new(2, 32));
        let pool: Arc<dyn BufferPool> = shared.clone();
        {
            let mut buffer = PooledBuffer::acquire(&pool, 8);
            buffer[0] = 7;
            assert_eq!(buffer.len(), 32);
            assert_eq!(shared.idle(), 0);
        }
        assert_eq!(shared.idle(), 1);
    }
}
