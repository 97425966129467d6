//! Message frames backed by a recycling buffer pool.
//!
//! A [`Frame`](frame::Frame) is the unit of a message. Its payload is either
//! absent, supplied by the caller, or taken from a
//! [`BufferPool`](pool::BufferPool). Pool-owned payloads can be shared by many
//! frames without copying; the buffer goes back to the pool when the last
//! owner releases it.
//!
//! # Crate Structure
//!
//! - [`pool`]: size-class buffer pool and atomic reference counter
//! - [`frame`]: frames, flags, and their ownership operations

/// Re-export pool types.
pub mod pool {
    pub use msgframe_pool::*;
}

/// Re-export frame types.
pub mod frame {
    pub use msgframe_frame::*;
}
