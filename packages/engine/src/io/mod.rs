//! Pooled buffer I/O
//!
//! - `pool`: the [`BufferPool`] collaborator and its default implementation
//! - `buffered`: buffered readers and writers that borrow from a pool

pub mod buffered;
pub mod pool;

pub use buffered::{PooledReader, PooledWriter};
pub use pool::{BufferPool, DEFAULT_BUFFER_SIZE, PooledBuffer, SharedBufferPool};
