// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::slot::{Settled, SharedSlot};

/// The read side of a result slot.
///
/// Futures are cheap `Clone` handles; any number of them may observe one slot. Consumers
/// can block ([`wait`][Self::wait], [`wait_for`][Self::wait_for]), observe without
/// blocking ([`is_ready`][Self::is_ready], [`error`][Self::error]), register completion
/// callbacks, or chain continuations ([`then`][Self::then], [`catching`][Self::catching],
/// [`retry`][Self::retry]).
///
/// # Continuation threads
///
/// Continuations run on whichever thread performs the terminal transition of the upstream
/// slot, or on the registering thread when the slot is already terminal. Work scheduled
/// through them should therefore be short; push long work through
/// [`spawn`][crate::spawn] instead.
pub struct Future<T> {
    slot: Arc<SharedSlot<T>>,
}

impl<T> Future<T> {
    pub(crate) fn from_slot(slot: Arc<SharedSlot<T>>) -> Self {
        Self { slot }
    }

    /// Whether the slot holds a terminal outcome.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.is_completed()
    }

    /// Whether cancellation was requested on the slot.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }

    /// The stored error, if the slot settled with one. Non-blocking.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.slot.error()
    }

    /// Requests cancellation of the slot.
    ///
    /// Cancellation is observational for in-flight producers: user code is not
    /// interrupted, but value callbacks will never fire and waiters fail with
    /// [`Error::Cancelled`]. Returns true iff this call performed the transition.
    pub fn cancel(&self) -> bool {
        self.slot.cancel()
    }
}

impl<T> Future<T>
where
    T: Clone + Send + 'static,
{
    /// Blocks until the slot settles and surfaces the outcome.
    ///
    /// # Errors
    ///
    /// The stored error on rejection, [`Error::Cancelled`] on a cancelled slot.
    pub fn wait(&self) -> Result<T> {
        self.slot.wait()
    }

    /// Blocks until the slot settles and surfaces the outcome. Alias of
    /// [`wait`][Self::wait], kept for call sites that read better as a getter.
    ///
    /// # Errors
    ///
    /// See [`wait`][Self::wait].
    pub fn get(&self) -> Result<T> {
        self.wait()
    }

    /// Waits up to `timeout` for the value. On timeout the future is cancelled and
    /// `Ok(None)` is returned; use [`try_wait_for`][Self::try_wait_for] when the slot
    /// should survive the deadline.
    ///
    /// # Errors
    ///
    /// See [`wait`][Self::wait].
    pub fn wait_for(&self, timeout: Duration) -> Result<Option<T>> {
        let outcome = self.slot.wait_deadline(timeout)?;
        if outcome.is_none() {
            self.slot.cancel();
        }

        Ok(outcome)
    }

    /// Waits up to `timeout` for the value without cancelling on timeout.
    ///
    /// # Errors
    ///
    /// See [`wait`][Self::wait].
    pub fn try_wait_for(&self, timeout: Duration) -> Result<Option<T>> {
        self.slot.wait_deadline(timeout)
    }

    /// Registers a completion callback, FIFO relative to other callbacks on this slot.
    ///
    /// If the slot already holds a value the callback runs immediately on the calling
    /// thread; if the slot errored or was cancelled (now or later), the callback is
    /// dropped silently. A panicking callback does not prevent later callbacks.
    pub fn on_complete(&self, callback: impl FnOnce(T) + Send + 'static) {
        self.slot.on_complete(callback);
    }

    /// Chains a transformation onto this future.
    ///
    /// The returned future resolves with `func(value)` once this one resolves. Errors and
    /// cancellation propagate unchanged; a panic inside `func` rejects the downstream
    /// future with [`Error::UserPanic`].
    pub fn then<U, F>(&self, func: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let downstream = Promise::new();
        let chained = downstream.future();

        self.slot.on_settled(Box::new(move |settled| match settled {
            Settled::Value(value) => match catch_unwind(AssertUnwindSafe(move || func(value))) {
                Ok(mapped) => _ = downstream.resolve(mapped),
                Err(payload) => _ = downstream.reject(Error::user_panic(payload)),
            },
            Settled::Error(error) => _ = downstream.reject(error),
            Settled::Cancelled => _ = downstream.cancel(),
        }));

        chained
    }

    /// Chains an error recovery onto this future.
    ///
    /// On upstream rejection the returned future resolves with `func(error)`; values pass
    /// through unchanged and cancellation still propagates as cancellation.
    pub fn catching<F>(&self, func: F) -> Future<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        let downstream = Promise::new();
        let recovered = downstream.future();

        self.slot.on_settled(Box::new(move |settled| match settled {
            Settled::Value(value) => _ = downstream.resolve(value),
            Settled::Error(error) => match catch_unwind(AssertUnwindSafe(move || func(error))) {
                Ok(recovery) => _ = downstream.resolve(recovery),
                Err(payload) => _ = downstream.reject(Error::user_panic(payload)),
            },
            Settled::Cancelled => _ = downstream.cancel(),
        }));

        recovered
    }

    /// Chains a transformation that is re-invoked when it panics.
    ///
    /// After this future resolves, `func(value)` runs; if it panics it is retried up to
    /// `max_retries` additional times. When `backoff` is set, the k-th retry is preceded
    /// by a sleep of `backoff * k`. The last panic is surfaced as [`Error::UserPanic`]
    /// once the retries are exhausted.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `max_retries` is negative (validated eagerly).
    pub fn retry<U, F>(&self, func: F, max_retries: i32, backoff: Option<Duration>) -> Result<Future<U>>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> U + Send + 'static,
    {
        if max_retries < 0 {
            return Err(Error::invalid_argument("max_retries must be non-negative"));
        }

        let downstream = Promise::new();
        let retried = downstream.future();

        self.slot.on_settled(Box::new(move |settled| match settled {
            Settled::Value(value) => {
                let mut retries_used: u32 = 0;
                loop {
                    let attempt_value = value.clone();
                    match catch_unwind(AssertUnwindSafe(|| func(attempt_value))) {
                        Ok(mapped) => {
                            _ = downstream.resolve(mapped);
                            return;
                        }
                        Err(payload) => {
                            if i64::from(retries_used) >= i64::from(max_retries) {
                                _ = downstream.reject(Error::user_panic(payload));
                                return;
                            }

                            retries_used += 1;
                            if let Some(step) = backoff {
                                thread::sleep(step.saturating_mul(retries_used));
                            }
                        }
                    }
                }
            }
            Settled::Error(error) => _ = downstream.reject(error),
            Settled::Cancelled => _ = downstream.cancel(),
        }));

        Ok(retried)
    }

    pub(crate) fn on_settled_edge(&self, edge: Box<dyn FnOnce(Settled<T>) + Send>) {
        self.slot.on_settled(edge);
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.slot.is_completed())
            .field("cancelled", &self.slot.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Future<i32>: Send, Sync, Clone);
    }

    #[test]
    fn then_chain_transforms_the_value() {
        let promise = Promise::new();
        let future = promise.future().then(|x: i32| x * 2).then(|x| x + 1);

        promise.resolve(5).unwrap();
        assert_eq!(future.wait().unwrap(), 11);
    }

    #[test]
    fn cancel_propagates_through_then() {
        let promise = Promise::<i32>::new();
        let future = promise.future().then(|x| x + 1);

        promise.future().cancel();
        assert!(matches!(future.wait(), Err(Error::Cancelled)));
    }

    #[test]
    fn error_propagates_through_then_unchanged() {
        let promise = Promise::<i32>::new();
        let future = promise.future().then(|x| x + 1);

        promise.reject(Error::Timeout).unwrap();
        assert!(matches!(future.wait(), Err(Error::Timeout)));
    }

    #[test]
    fn panic_inside_then_rejects_downstream() {
        let promise = Promise::<i32>::new();
        let future = promise.future().then(|_| -> i32 { panic!("mapper exploded") });

        promise.resolve(1).unwrap();
        match future.wait() {
            Err(Error::UserPanic(message)) => assert_eq!(message, "mapper exploded"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn then_registered_after_completion_runs_immediately() {
        let promise = Promise::new();
        promise.resolve(4).unwrap();

        let future = promise.future().then(|x: i32| x * 10);
        assert_eq!(future.wait().unwrap(), 40);
    }

    #[test]
    fn catching_recovers_from_errors() {
        let promise = Promise::<i32>::new();
        let future = promise.future().catching(|_| -1);

        promise.reject(Error::Timeout).unwrap();
        assert_eq!(future.wait().unwrap(), -1);
    }

    #[test]
    fn catching_passes_values_through() {
        let promise = Promise::new();
        let future = promise.future().catching(|_| -1);

        promise.resolve(3).unwrap();
        assert_eq!(future.wait().unwrap(), 3);
    }

    #[test]
    fn catching_still_propagates_cancellation() {
        let promise = Promise::<i32>::new();
        let future = promise.future().catching(|_| -1);

        promise.cancel();
        assert!(matches!(future.wait(), Err(Error::Cancelled)));
    }

    #[test]
    fn retry_recovers_after_transient_panics() {
        let promise = Promise::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let future = promise
            .future()
            .retry(
                {
                    let calls = Arc::clone(&calls);
                    move |x: i32| {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            panic!("transient");
                        }
                        x * 2
                    }
                },
                3,
                None,
            )
            .unwrap();

        promise.resolve(21).unwrap();
        assert_eq!(future.wait().unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_exhausts_and_surfaces_the_last_panic() {
        let promise = Promise::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let future = promise
            .future()
            .retry(
                {
                    let calls = Arc::clone(&calls);
                    move |_: i32| -> i32 {
                        calls.fetch_add(1, Ordering::SeqCst);
                        panic!("always");
                    }
                },
                2,
                None,
            )
            .unwrap();

        promise.resolve(1).unwrap();
        assert!(matches!(future.wait(), Err(Error::UserPanic(_))));
        // One initial invocation plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_rejects_negative_retry_counts_eagerly() {
        let promise = Promise::<i32>::new();
        let result = promise.future().retry(|x| x, -1, None);

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn retry_backoff_scales_with_the_attempt() {
        let promise = Promise::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let future = promise
            .future()
            .retry(
                {
                    let calls = Arc::clone(&calls);
                    move |x: i32| {
                        if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                            panic!("transient");
                        }
                        x
                    }
                },
                2,
                Some(Duration::from_millis(10)),
            )
            .unwrap();

        let started = Instant::now();
        promise.resolve(1).unwrap();
        assert_eq!(future.wait().unwrap(), 1);

        // Sleeps of 10ms and 20ms happened before the third call succeeded.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn wait_for_times_out_and_cancels() {
        let promise = Promise::<i32>::new();
        let future = promise.future();

        let outcome = future.wait_for(Duration::from_millis(20)).unwrap();
        assert!(outcome.is_none());
        assert!(future.is_cancelled());
        assert!(matches!(promise.resolve(1), Err(Error::Cancelled)));
    }

    #[test]
    fn try_wait_for_times_out_without_cancelling() {
        let promise = Promise::new();
        let future = promise.future();

        let outcome = future.try_wait_for(Duration::from_millis(20)).unwrap();
        assert!(outcome.is_none());
        assert!(!future.is_cancelled());

        promise.resolve(2).unwrap();
        assert_eq!(future.wait().unwrap(), 2);
    }

    #[test]
    fn wait_on_cancelled_future_fails() {
        let promise = Promise::<i32>::new();
        let future = promise.future();

        future.cancel();
        assert!(matches!(future.wait(), Err(Error::Cancelled)));
        assert!(future.is_cancelled());
        assert!(future.is_ready());
    }

    #[test]
    fn error_observer_reports_rejections_only() {
        let promise = Promise::<i32>::new();
        let future = promise.future();

        assert!(future.error().is_none());
        promise.reject(Error::Timeout).unwrap();
        assert!(matches!(future.error(), Some(Error::Timeout)));
    }
}
