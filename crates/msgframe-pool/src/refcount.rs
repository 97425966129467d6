use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic count of the logical owners of one shared buffer.
///
/// All updates are single atomic instructions, so when several owners
/// decrement by one concurrently exactly one of them observes `0`.
///
/// The frame layer creates a counter per shared buffer and only adds and
/// removes owners. [`set`](RefCounter::set) is there for callers that recycle
/// a counter for a new share.
#[derive(Debug, Default)]
pub struct RefCounter {
    value: AtomicUsize,
}

impl RefCounter {
    /// Create a counter holding `value`.
    pub fn new(value: usize) -> Self {
        Self {
            value: AtomicUsize::new(value),
        }
    }

    /// Current count.
    pub fn get(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrite the count.
    pub fn set(&self, value: usize) {
        self.value.store(value, Ordering::Release);
    }

    /// Add `amount` owners.
    pub fn increase(&self, amount: usize) {
        // New owners are always derived from an existing one, so no ordering
        // with other memory is needed here.
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Remove `amount` owners and return the resulting count.
    ///
    /// Saturates at zero, so every call after the count ran out also returns
    /// `0`; callers that act on zero must make that action take-once.
    pub fn decrement(&self, amount: usize) -> usize {
        let previous = match self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(amount))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        previous.saturating_sub(amount)
    }
}
