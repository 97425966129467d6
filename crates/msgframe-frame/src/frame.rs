use std::fmt;
use std::mem;
use std::sync::Arc;

use bytes::BytesMut;
use msgframe_pool::BufferPool;
use tracing::debug;

use crate::error::{FrameError, Result};
use crate::flags::FrameFlags;
use crate::share::{PayloadCell, ShareHandle, Unavailable};

/// Payload ownership kind of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Not initialized; the only state in which `init_*` is allowed.
    Uninitialized,
    /// Initialized, without payload.
    Empty,
    /// Boundary marker between grouped frames; no payload.
    Delimiter,
    /// Payload handed over by the caller; never returned to a pool.
    ExternallyOwned,
    /// Payload taken from a [`BufferPool`] and returned by its last owner.
    PoolOwned,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Uninitialized => "Uninitialized",
            FrameKind::Empty => "Empty",
            FrameKind::Delimiter => "Delimiter",
            FrameKind::ExternallyOwned => "ExternallyOwned",
            FrameKind::PoolOwned => "PoolOwned",
        };
        f.write_str(name)
    }
}

/// One message unit.
///
/// A frame starts [`Uninitialized`](FrameKind::Uninitialized), is given a
/// payload kind by exactly one `init_*` call, and returns to `Uninitialized`
/// through [`close`](Frame::close). Closing twice is an error.
///
/// Pool-owned payloads may be shared with other frames through
/// [`copy_from`](Frame::copy_from) or
/// [`add_references`](Frame::add_references) +
/// [`claim_reference`](Frame::claim_reference). Each owner releases once; the
/// buffer goes back to the pool on the last release only.
///
/// Dropping a frame that still owns pool memory releases it, so a missed
/// `close` does not leak the buffer.
pub struct Frame {
    content: Content,
    flags: FrameFlags,
    size: usize,
}

enum Content {
    Uninitialized,
    Empty,
    Delimiter,
    External(Arc<PayloadCell>),
    Pooled(Pooled),
}

enum Pooled {
    Exclusive { buffer: BytesMut, pool: BufferPool },
    Shared(ShareHandle),
}

impl Content {
    fn kind(&self) -> FrameKind {
        match self {
            Content::Uninitialized => FrameKind::Uninitialized,
            Content::Empty => FrameKind::Empty,
            Content::Delimiter => FrameKind::Delimiter,
            Content::External(_) => FrameKind::ExternallyOwned,
            Content::Pooled(_) => FrameKind::PoolOwned,
        }
    }

    /// Duplicate a payload that carries no pool ownership.
    fn duplicate_unpooled(&self) -> Content {
        match self {
            Content::Empty => Content::Empty,
            Content::Delimiter => Content::Delimiter,
            Content::External(buffer) => Content::External(Arc::clone(buffer)),
            Content::Uninitialized | Content::Pooled(_) => Content::Uninitialized,
        }
    }
}

impl Frame {
    /// Create an uninitialized frame.
    pub fn new() -> Self {
        Self::with_content(Content::Uninitialized, 0)
    }

    /// Create an empty frame.
    pub fn empty() -> Self {
        Self::with_content(Content::Empty, 0)
    }

    /// Create a delimiter frame.
    pub fn delimiter() -> Self {
        Self::with_content(Content::Delimiter, 0)
    }

    /// Create a frame that takes ownership of `buffer` and exposes its first
    /// `size` bytes.
    pub fn externally_owned(buffer: impl Into<BytesMut>, size: usize) -> Result<Self> {
        let mut frame = Self::new();
        frame.init_externally_owned(buffer, size)?;
        Ok(frame)
    }

    /// Create a frame with a zero-filled `size`-byte payload from `pool`.
    pub fn pool_owned(pool: &BufferPool, size: usize) -> Self {
        Self::with_content(Content::Pooled(Self::take_zeroed(pool, size)), size)
    }

    /// Create a pool-owned frame holding a copy of `data`.
    pub fn from_slice(pool: &BufferPool, data: &[u8]) -> Self {
        let mut buffer = pool.take(data.len());
        buffer.extend_from_slice(data);
        let pooled = Pooled::Exclusive {
            buffer,
            pool: pool.clone(),
        };
        Self::with_content(Content::Pooled(pooled), data.len())
    }

    fn with_content(content: Content, size: usize) -> Self {
        Self {
            content,
            flags: FrameFlags::empty(),
            size,
        }
    }

    fn take_zeroed(pool: &BufferPool, size: usize) -> Pooled {
        let mut buffer = pool.take(size);
        buffer.resize(size, 0);
        Pooled::Exclusive {
            buffer,
            pool: pool.clone(),
        }
    }

    /// Initialize as an empty frame.
    pub fn init_empty(&mut self) -> Result<()> {
        self.ensure_uninitialized()?;
        self.adopt(Content::Empty, 0);
        Ok(())
    }

    /// Initialize as a delimiter frame.
    pub fn init_delimiter(&mut self) -> Result<()> {
        self.ensure_uninitialized()?;
        self.adopt(Content::Delimiter, 0);
        Ok(())
    }

    /// Initialize with a caller-supplied buffer, exposing its first `size` bytes.
    ///
    /// The frame takes ownership of the buffer; a borrowed slice is copied
    /// into a new one. Frames duplicated with [`copy_from`](Frame::copy_from)
    /// share it. Nothing is ever returned to a pool.
    pub fn init_externally_owned(&mut self, buffer: impl Into<BytesMut>, size: usize) -> Result<()> {
        self.ensure_uninitialized()?;
        let buffer = buffer.into();
        if size > buffer.len() {
            return Err(FrameError::OutOfBounds {
                offset: 0,
                len: size,
                size: buffer.len(),
            });
        }
        self.adopt(Content::External(Arc::new(PayloadCell::new(buffer))), size);
        Ok(())
    }

    /// Initialize with a zero-filled `size`-byte buffer taken from `pool`.
    pub fn init_pool_owned(&mut self, pool: &BufferPool, size: usize) -> Result<()> {
        self.ensure_uninitialized()?;
        self.adopt(Content::Pooled(Self::take_zeroed(pool, size)), size);
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Err(self.invalid_state("initialize"));
        }
        Ok(())
    }

    fn adopt(&mut self, content: Content, size: usize) {
        self.content = content;
        self.flags = FrameFlags::empty();
        self.size = size;
    }

    /// Release this frame's hold on its payload and return to `Uninitialized`.
    ///
    /// A pool-owned buffer goes back to the pool if this frame was its only
    /// or last owner. Fails if the frame is already uninitialized.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Err(self.invalid_state("close"));
        }
        self.release();
        Ok(())
    }

    fn release(&mut self) {
        if let Content::Pooled(pooled) = self.take_content() {
            match pooled {
                Pooled::Exclusive { buffer, pool } => pool.give(buffer),
                Pooled::Shared(handle) => {
                    handle.release(1);
                }
            }
        }
    }

    fn take_content(&mut self) -> Content {
        self.flags = FrameFlags::empty();
        self.size = 0;
        mem::replace(&mut self.content, Content::Uninitialized)
    }

    /// Register `amount` additional owners of the pool-owned payload.
    ///
    /// No-op for other kinds. Each added owner must eventually be released,
    /// either by a frame obtained from [`claim_reference`](Frame::claim_reference)
    /// or through [`remove_references`](Frame::remove_references).
    pub fn add_references(&mut self, amount: usize) {
        if amount == 0 {
            return;
        }
        self.share(amount);
    }

    /// Materialize one owner previously registered with
    /// [`add_references`](Frame::add_references) as its own frame.
    ///
    /// The owner count is not changed. Fails unless the payload is shared.
    pub fn claim_reference(&self) -> Result<Frame> {
        match &self.content {
            Content::Pooled(Pooled::Shared(handle)) => Ok(Frame {
                content: Content::Pooled(Pooled::Shared(handle.clone())),
                flags: self.flags,
                size: self.size,
            }),
            _ => Err(self.invalid_state("claim a reference")),
        }
    }

    /// Release `amount` owners of the payload at once.
    ///
    /// Equivalent to [`close`](Frame::close) when the payload is not shared.
    /// When the owner count reaches zero the buffer returns to the pool and
    /// this frame becomes `Uninitialized`. Never fails.
    pub fn remove_references(&mut self, amount: usize) {
        if amount == 0 {
            return;
        }
        let Content::Pooled(Pooled::Shared(handle)) = &self.content else {
            if self.is_initialized() {
                self.release();
            }
            return;
        };
        if handle.release(amount) {
            drop(self.take_content());
        }
    }

    /// Move a pool-owned payload behind a share handle and register `extra`
    /// more owners.
    fn share(&mut self, extra: usize) -> Option<ShareHandle> {
        let handle = match mem::replace(&mut self.content, Content::Uninitialized) {
            Content::Pooled(Pooled::Exclusive { buffer, pool }) => {
                ShareHandle::new(buffer, pool, 1 + extra)
            }
            Content::Pooled(Pooled::Shared(handle)) => {
                handle.add_owners(extra);
                handle
            }
            other => {
                self.content = other;
                return None;
            }
        };
        self.content = Content::Pooled(Pooled::Shared(handle.clone()));
        Some(handle)
    }

    /// Make this frame a second owner of `source`'s payload.
    ///
    /// Any payload this frame held is released first. A pool-owned source
    /// becomes shared; both frames must be closed independently.
    pub fn copy_from(&mut self, source: &mut Frame) -> Result<()> {
        if !source.is_initialized() {
            return Err(source.invalid_state("copy from source"));
        }
        if self.is_initialized() {
            self.release();
        }

        let content = match source.share(1) {
            Some(handle) => Content::Pooled(Pooled::Shared(handle)),
            None => source.content.duplicate_unpooled(),
        };
        self.content = content;
        self.flags = source.flags;
        self.size = source.size;
        Ok(())
    }

    /// Take over `source`'s payload; `source` is left as an empty frame.
    ///
    /// The owner count is unchanged. Any payload this frame held is released
    /// first.
    pub fn move_from(&mut self, source: &mut Frame) -> Result<()> {
        if !source.is_initialized() {
            return Err(source.invalid_state("move from source"));
        }
        if self.is_initialized() {
            self.release();
        }

        self.content = mem::replace(&mut source.content, Content::Empty);
        self.flags = mem::take(&mut source.flags);
        self.size = mem::take(&mut source.size);
        Ok(())
    }

    /// Payload ownership kind.
    pub fn kind(&self) -> FrameKind {
        self.content.kind()
    }

    /// Number of valid payload bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current flags. `SHARED` is derived from the live owner count.
    pub fn flags(&self) -> FrameFlags {
        if self.is_shared() {
            self.flags | FrameFlags::SHARED
        } else {
            self.flags
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.content, Content::Uninitialized)
    }

    pub fn is_delimiter(&self) -> bool {
        matches!(self.content, Content::Delimiter)
    }

    pub fn has_more(&self) -> bool {
        self.flags.contains(FrameFlags::MORE)
    }

    pub fn is_identity(&self) -> bool {
        self.flags.contains(FrameFlags::IDENTITY)
    }

    /// True while the pool-owned payload has more than one owner.
    pub fn is_shared(&self) -> bool {
        matches!(&self.content, Content::Pooled(Pooled::Shared(handle)) if handle.owners() > 1)
    }

    /// Owners of a pool-owned payload; `None` for other kinds.
    pub fn reference_count(&self) -> Option<usize> {
        match &self.content {
            Content::Pooled(Pooled::Exclusive { .. }) => Some(1),
            Content::Pooled(Pooled::Shared(handle)) => Some(handle.owners()),
            _ => None,
        }
    }

    /// Set `MORE` and/or `IDENTITY`. `SHARED` is ignored.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags.insert(flags & FrameFlags::USER);
    }

    /// Clear `MORE` and/or `IDENTITY`. `SHARED` is ignored.
    pub fn reset_flags(&mut self, flags: FrameFlags) {
        self.flags.remove(flags & FrameFlags::USER);
    }

    /// Run `f` over the valid payload bytes.
    ///
    /// `f` may read other frames holding the same buffer. Writing to one of
    /// them from inside `f` fails with [`FrameError::PayloadInUse`].
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let size = self.size;
        let kind = self.kind();
        let to_error = |reason| unavailable(kind, reason);
        match &self.content {
            Content::External(cell) => cell.with(|buffer| f(&buffer[..size])).map_err(to_error),
            Content::Pooled(Pooled::Exclusive { buffer, .. }) => Ok(f(&buffer[..size])),
            Content::Pooled(Pooled::Shared(handle)) => handle
                .with_buffer(|buffer| f(&buffer[..size]))
                .map_err(to_error),
            _ => Err(FrameError::NoPayload { kind }),
        }
    }

    /// Run `f` over the valid payload bytes, mutably.
    ///
    /// Writes through a shared frame are visible to every owner. Any access
    /// to another frame holding the same buffer from inside `f` fails with
    /// [`FrameError::PayloadInUse`].
    pub fn with_payload_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let size = self.size;
        let kind = self.kind();
        let to_error = |reason| unavailable(kind, reason);
        match &mut self.content {
            Content::External(cell) => cell
                .with_mut(|buffer| f(&mut buffer[..size]))
                .map_err(to_error),
            Content::Pooled(Pooled::Exclusive { buffer, .. }) => Ok(f(&mut buffer[..size])),
            Content::Pooled(Pooled::Shared(handle)) => handle
                .with_buffer_mut(|buffer| f(&mut buffer[..size]))
                .map_err(to_error),
            _ => Err(FrameError::NoPayload { kind }),
        }
    }

    /// Byte at `index`.
    pub fn get(&self, index: usize) -> Result<u8> {
        self.with_payload(|payload| payload.get(index).copied())?
            .ok_or_else(|| self.out_of_bounds(index, 1))
    }

    /// Overwrite the byte at `index`.
    pub fn set(&mut self, index: usize, value: u8) -> Result<()> {
        self.with_payload_mut(|payload| payload.get_mut(index).map(|byte| *byte = value))?
            .ok_or_else(|| self.out_of_bounds(index, 1))
    }

    /// Overwrite the first payload byte.
    pub fn put_byte(&mut self, value: u8) -> Result<()> {
        self.set(0, value)
    }

    /// Copy `source` into the payload starting at `offset`.
    pub fn put(&mut self, source: &[u8], offset: usize) -> Result<()> {
        self.with_payload_mut(|payload| {
            let dst = payload.get_mut(offset..offset.checked_add(source.len())?)?;
            dst.copy_from_slice(source);
            Some(())
        })?
        .ok_or_else(|| self.out_of_bounds(offset, source.len()))
    }

    /// Copy payload bytes starting at `offset` into `dst`, filling it entirely.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let len = dst.len();
        self.with_payload(|payload| {
            let src = payload.get(offset..offset.checked_add(len)?)?;
            dst.copy_from_slice(src);
            Some(())
        })?
        .ok_or_else(|| self.out_of_bounds(offset, len))
    }

    /// Copy of the valid payload bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.with_payload(<[u8]>::to_vec)
    }

    fn invalid_state(&self, op: &'static str) -> FrameError {
        FrameError::InvalidState {
            op,
            kind: self.kind(),
        }
    }

    fn out_of_bounds(&self, offset: usize, len: usize) -> FrameError {
        FrameError::OutOfBounds {
            offset,
            len,
            size: self.size,
        }
    }
}

fn unavailable(kind: FrameKind, reason: Unavailable) -> FrameError {
    match reason {
        Unavailable::Released => FrameError::NoPayload { kind },
        Unavailable::InUse => FrameError::PayloadInUse,
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if matches!(self.content, Content::Pooled(_)) {
            debug!(size = self.size, shared = self.is_shared(), "releasing pool-owned frame on drop");
            self.release();
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind())
            .field("size", &self.size)
            .field("flags", &self.flags())
            .field("references", &self.reference_count())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}, size={}, flags={}]",
            self.kind(),
            self.size,
            self.flags()
        )
    }
}
