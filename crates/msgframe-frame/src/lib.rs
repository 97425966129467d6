//! Message frames with explicit payload ownership.
//!
//! A [`Frame`] is the unit exchanged between transport endpoints. Its payload
//! is one of:
//! - nothing (`Empty`, `Delimiter`)
//! - a caller-supplied buffer (`ExternallyOwned`), never returned to a pool
//! - a buffer taken from a [`BufferPool`] (`PoolOwned`), returned exactly once
//!   when its last owner releases it
//!
//! Pool-owned payloads can be shared zero-copy between frames with
//! [`Frame::copy_from`] or [`Frame::add_references`]; an atomic owner count
//! decides which release hands the buffer back.

pub mod error;
pub mod flags;
pub mod frame;
mod share;

pub use error::{FrameError, Result};
pub use flags::FrameFlags;
pub use frame::{Frame, FrameKind};
pub use msgframe_pool::BufferPool;
