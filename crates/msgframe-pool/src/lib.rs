//! Buffer pooling and shared reference counting for message frames.
//!
//! This is the lowest layer of msgframe. It provides:
//! - [`BufferPool`]: a thread-safe allocator that recycles byte buffers,
//!   bucketed by power-of-two size class
//! - [`RefCounter`]: an atomic owner count used while one pooled buffer is
//!   referenced by several frames
//!
//! Neither type knows about frames. The frame layer composes them to decide
//! when a buffer goes back to the pool.

pub mod config;
pub mod error;
pub mod pool;
pub mod refcount;

pub use config::{PoolConfig, PoolStrategy, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MIN_BUFFER_SIZE};
pub use error::{PoolError, Result};
pub use pool::{BufferPool, PoolStats};
pub use refcount::RefCounter;
