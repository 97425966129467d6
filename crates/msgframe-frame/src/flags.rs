//! Frame flags.
//!
//! Flags are independent of the payload kind. `SHARED` is maintained by the
//! frame itself and cannot be set or cleared through the public flag setters.

use bitflags::bitflags;

bitflags! {
    /// Per-frame flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FrameFlags: u8 {
        /// More frames of the same message follow this one.
        const MORE = 0b0000_0001;

        /// The frame carries a peer identity rather than application data.
        const IDENTITY = 0b0100_0000;

        /// The pool-owned payload currently has more than one owner.
        const SHARED = 0b1000_0000;
    }
}

impl FrameFlags {
    /// Flags callers may set or reset directly.
    pub const USER: Self = Self::MORE.union(Self::IDENTITY);
}

impl std::fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        bitflags::parser::to_writer(self, f)
    }
}
