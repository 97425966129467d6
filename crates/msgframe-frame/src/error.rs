use crate::frame::FrameKind;

/// Errors raised by frame operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The operation is not allowed in the frame's current state, e.g.
    /// closing an uninitialized frame or initializing a live one.
    #[error("cannot {op}: frame is {kind}")]
    InvalidState { op: &'static str, kind: FrameKind },

    /// Byte access outside the valid payload range.
    #[error("payload access out of bounds (offset {offset}, len {len}, size {size})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// The frame kind carries no payload buffer.
    #[error("{kind} frame has no payload")]
    NoPayload { kind: FrameKind },

    /// The payload is already borrowed by an enclosing access on this thread
    /// through another frame holding the same buffer.
    #[error("payload is in use by an enclosing access")]
    PayloadInUse,
}

pub type Result<T> = std::result::Result<T, FrameError>;
