// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;

use pact::{Future, Promise};

use crate::error::{Error, Result};

const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because invoke-once guarantees can no longer be upheld";

type Job<R> = Box<dyn FnOnce() -> R + Send>;

/// A callable bundled with the promise of its result.
///
/// The callable runs at most once across all threads. Cancelling before invocation
/// prevents execution and settles the embedded slot as cancelled; cancelling afterwards
/// has no effect on the already-set result.
///
/// Dropping an uninvoked task rejects its futures with [`pact::Error::BrokenPromise`],
/// the same way a dropped [`Promise`] would.
///
/// # Example
///
/// ```
/// use chore::PackagedTask;
///
/// let task = PackagedTask::new(|| "done");
/// let future = task.future();
///
/// task.invoke().unwrap();
/// assert_eq!(future.wait().unwrap(), "done");
/// ```
pub struct PackagedTask<R> {
    job: Mutex<Option<Job<R>>>,
    promise: Promise<R>,
}

impl<R> PackagedTask<R>
where
    R: Clone + Send + 'static,
{
    /// Wraps a callable. Arguments are bound by capture.
    #[must_use]
    pub fn new(job: impl FnOnce() -> R + Send + 'static) -> Self {
        Self {
            job: Mutex::new(Some(Box::new(job))),
            promise: Promise::new(),
        }
    }

    /// Returns a future observing the task's result slot. May be called any number of
    /// times, before or after invocation.
    #[must_use]
    pub fn future(&self) -> Future<R> {
        self.promise.future()
    }

    /// Runs the wrapped callable and settles the embedded slot.
    ///
    /// The callable executes at most once across all threads. If the task was cancelled
    /// first, the callable is discarded and the slot stays cancelled. A panic in the
    /// callable rejects the slot with [`pact::Error::UserPanic`]. Completion callbacks
    /// fan out in registration order afterwards.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTask`] if the callable was already consumed by an earlier invoke.
    pub fn invoke(&self) -> Result<()> {
        let job = self
            .job
            .lock()
            .expect(ERR_POISONED_LOCK)
            .take()
            .ok_or(Error::InvalidTask)?;

        if self.is_cancelled() {
            // The slot already settled as cancelled; the callable is simply dropped.
            return Ok(());
        }

        match catch_unwind(AssertUnwindSafe(job)) {
            // A concurrent cancel can win the settle race; the result is discarded then.
            Ok(value) => _ = self.promise.resolve(value),
            Err(payload) => _ = self.promise.reject(pact::Error::user_panic(payload)),
        }

        Ok(())
    }

    /// Registers a completion callback on the embedded slot, FIFO relative to other
    /// callbacks. Delivered with the resolved value, or not at all on error/cancel.
    pub fn on_complete(&self, callback: impl FnOnce(R) + Send + 'static) {
        self.promise.on_complete(callback);
    }

    /// Requests cancellation. Before invocation this prevents the callable from running;
    /// afterwards it only flips the cancellation bit. Returns true iff this call
    /// performed the transition.
    pub fn cancel(&self) -> bool {
        self.promise.cancel()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.promise.future().is_cancelled()
    }

    /// Whether the task still holds its callable (i.e. `invoke` has not consumed it).
    #[must_use]
    pub fn valid(&self) -> bool {
        self.job.lock().expect(ERR_POISONED_LOCK).is_some()
    }
}

impl<R> fmt::Debug for PackagedTask<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagedTask")
            .field("valid", &self.job.lock().expect(ERR_POISONED_LOCK).is_some())
            .finish_non_exhaustive()
    }
}
