// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::future::Future;
use crate::slot::SharedSlot;

/// The unique write side of a result slot.
///
/// A promise settles its slot exactly once, through [`resolve`][Self::resolve],
/// [`reject`][Self::reject], or [`cancel`][Self::cancel]. Dropping the promise without
/// settling transitions the slot to [`Error::BrokenPromise`], so waiters never hang on a
/// producer that went away.
///
/// # Thread safety
///
/// The promise is `Send` and `Sync`; it is movable but deliberately not `Clone` - a slot
/// has a single writer.
///
/// # Example
///
/// ```
/// use pact::Promise;
///
/// let promise = Promise::new();
/// let future = promise.future();
///
/// promise.resolve(5).unwrap();
/// assert_eq!(future.wait().unwrap(), 5);
/// ```
pub struct Promise<T> {
    slot: Arc<SharedSlot<T>>,
}

impl<T> Promise<T> {
    /// Creates a promise over a fresh, empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(SharedSlot::new()),
        }
    }

    /// Returns a future observing the same slot.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        Future::from_slot(Arc::clone(&self.slot))
    }

    /// Rejects the slot with an error.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadySettled`] if the slot completed, [`Error::Cancelled`] if it was
    /// cancelled first.
    pub fn reject(&self, error: Error) -> Result<()> {
        self.slot.reject(error)
    }

    /// Requests cancellation. If the slot is still empty this also completes it as
    /// cancelled, failing any waiters. Returns true iff this call performed the
    /// transition; cancelling twice returns false the second time.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Resolves the slot with a value and fans it out to callbacks and continuations.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadySettled`] if the slot completed, [`Error::Cancelled`] if it was
    /// cancelled first.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.slot.resolve(value)
    }

    /// Registers a completion callback on the underlying slot; equivalent to
    /// registering through [`future()`][Self::future].
    pub fn on_complete(&self, callback: impl FnOnce(T) + Send + 'static) {
        self.slot.on_complete(callback);
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        // Transitions Empty -> Error(BrokenPromise); a no-op on settled slots.
        self.slot.broken();
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.slot.is_completed())
            .field("cancelled", &self.slot.is_cancelled())
            .finish()
    }
}
