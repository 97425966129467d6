use std::cell::RefCell;
use std::sync::Arc;

use bytes::BytesMut;
use msgframe_pool::{BufferPool, RefCounter};
use parking_lot::ReentrantMutex;
use tracing::trace;

/// Why a [`PayloadCell`] could not be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unavailable {
    /// The buffer already went back to its pool.
    Released,
    /// An enclosing access on this thread holds the buffer in a conflicting mode.
    InUse,
}

/// A buffer reachable from several frames.
///
/// The lock is reentrant, so a closure running over one frame's payload may
/// read another frame that holds the same buffer. Any nested access that
/// would alias a mutable borrow fails with [`Unavailable::InUse`] instead of
/// blocking.
pub(crate) struct PayloadCell {
    buffer: ReentrantMutex<RefCell<Option<BytesMut>>>,
}

impl PayloadCell {
    pub(crate) fn new(buffer: BytesMut) -> Self {
        Self {
            buffer: ReentrantMutex::new(RefCell::new(Some(buffer))),
        }
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&BytesMut) -> R) -> Result<R, Unavailable> {
        let guard = self.buffer.lock();
        let slot = guard.try_borrow().map_err(|_| Unavailable::InUse)?;
        slot.as_ref().map(f).ok_or(Unavailable::Released)
    }

    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(&mut BytesMut) -> R) -> Result<R, Unavailable> {
        let guard = self.buffer.lock();
        let mut slot = guard.try_borrow_mut().map_err(|_| Unavailable::InUse)?;
        slot.as_mut().map(f).ok_or(Unavailable::Released)
    }

    /// Remove the buffer. `None` if it is gone or borrowed by an enclosing
    /// access on this thread.
    fn take(&self) -> Option<BytesMut> {
        let guard = self.buffer.lock();
        let mut slot = guard.try_borrow_mut().ok()?;
        slot.take()
    }

    fn take_exclusive(&mut self) -> Option<BytesMut> {
        self.buffer.get_mut().get_mut().take()
    }
}

/// Association between a pooled buffer and the frames that reference it.
///
/// Cloning a handle does not touch the owner count; callers adjust the count
/// explicitly before duplicating a handle into another frame.
#[derive(Clone)]
pub(crate) struct ShareHandle {
    slot: Arc<SharedSlot>,
}

struct SharedSlot {
    owners: RefCounter,
    payload: PayloadCell,
    pool: BufferPool,
}

impl Drop for SharedSlot {
    // Covers a last release that happened while an enclosing access still
    // borrowed the buffer.
    fn drop(&mut self) {
        if let Some(buffer) = self.payload.take_exclusive() {
            trace!(capacity = buffer.capacity(), "returning shared buffer on slot drop");
            self.pool.give(buffer);
        }
    }
}

impl ShareHandle {
    /// Start sharing `buffer` between `owners` frames.
    pub(crate) fn new(buffer: BytesMut, pool: BufferPool, owners: usize) -> Self {
        trace!(owners, capacity = buffer.capacity(), "pooled buffer became shared");
        Self {
            slot: Arc::new(SharedSlot {
                owners: RefCounter::new(owners),
                payload: PayloadCell::new(buffer),
                pool,
            }),
        }
    }

    pub(crate) fn add_owners(&self, amount: usize) {
        self.slot.owners.increase(amount);
    }

    pub(crate) fn owners(&self) -> usize {
        self.slot.owners.get()
    }

    /// Drop `amount` owners. Returns true when no owner is left; the buffer
    /// is then back in the pool, or will be once the last handle drops.
    pub(crate) fn release(&self, amount: usize) -> bool {
        if self.slot.owners.decrement(amount) != 0 {
            return false;
        }
        // Over-released counts reach here more than once; the slot hands the
        // buffer out only the first time.
        if let Some(buffer) = self.slot.payload.take() {
            trace!(capacity = buffer.capacity(), "last owner released shared buffer");
            self.slot.pool.give(buffer);
        }
        true
    }

    pub(crate) fn with_buffer<R>(&self, f: impl FnOnce(&BytesMut) -> R) -> Result<R, Unavailable> {
        self.slot.payload.with(f)
    }

    pub(crate) fn with_buffer_mut<R>(
        &self,
        f: impl FnOnce(&mut BytesMut) -> R,
    ) -> Result<R, Unavailable> {
        self.slot.payload.with_mut(f)
    }
}
