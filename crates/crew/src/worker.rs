// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hints::SchedulerHint;
use crate::{ERR_POISONED_LOCK, POLL_INTERVAL, Priority};

/// Lifecycle of a worker. Terminal states are sticky: once a worker is `Completed`,
/// `Failed`, or `Cancelled` it never changes state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// The worker has not been started.
    Initial = 0,

    /// The worker thread is executing the user closure.
    Running = 1,

    /// The closure returned normally.
    Completed = 2,

    /// The closure panicked.
    Failed = 3,

    /// The worker was cancelled.
    Cancelled = 4,
}

impl State {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Initial,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            4 => Self::Cancelled,
            _ => unreachable!("state is only ever stored from a State value"),
        }
    }

    /// Whether this is one of the sticky terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

struct WorkerInner<R> {
    future: Option<pact::Future<R>>,
    handle: Option<JoinHandle<()>>,
    callback: Option<Box<dyn FnOnce(R) + Send>>,
    timeout: Duration,
    hint: SchedulerHint,
}

/// A user closure running on its own dedicated thread.
///
/// The worker tracks the closure through the [`State`] lifecycle and exposes its result
/// through blocking and timed getters. The closure is not handed a cooperative
/// cancellation token; [`cancel`][Self::cancel] is best-effort and waits for in-flight
/// work to return.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use crew::AsyncWorker;
///
/// let worker = AsyncWorker::new();
/// worker.start_async(|| 2 + 2).unwrap();
///
/// assert_eq!(worker.get_result(Duration::ZERO).unwrap(), 4);
/// assert!(worker.is_done());
/// ```
pub struct AsyncWorker<R> {
    state: Arc<AtomicU8>,
    inner: Mutex<WorkerInner<R>>,
}

impl<R> AsyncWorker<R>
where
    R: Clone + Send + 'static,
{
    /// Creates a worker in the `Initial` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(State::Initial as u8)),
            inner: Mutex::new(WorkerInner {
                future: None,
                handle: None,
                callback: None,
                timeout: Duration::ZERO,
                hint: SchedulerHint::default(),
            }),
        }
    }

    /// Launches the closure on a dedicated worker thread.
    ///
    /// The worker transitions `Initial -> Running` atomically; the thread applies the
    /// configured scheduler hints, runs the closure, and lands in `Completed` or
    /// `Failed`. Arguments are bound by capture.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] if the worker left `Initial` before this call, and any
    /// I/O error from thread creation.
    pub fn start_async<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        if self
            .state
            .compare_exchange(
                State::Initial as u8,
                State::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(Error::AlreadyStarted);
        }

        let promise = pact::Promise::new();
        let future = promise.future();
        let state = Arc::clone(&self.state);

        let hint = {
            let mut inner = self.inner.lock().expect(ERR_POISONED_LOCK);
            inner.future = Some(future);
            inner.hint
        };

        let spawned = thread::Builder::new()
            .name("crew-worker".to_string())
            .spawn(move || {
                // The hint is opaque guidance; applying it means recording it for
                // observers rather than touching OS scheduling knobs.
                debug!(?hint, "worker thread started");

                // If settling the slot unwinds, the worker still lands in Failed.
                let failsafe = scopeguard::guard(Arc::clone(&state), |state| {
                    _ = state.compare_exchange(
                        State::Running as u8,
                        State::Failed as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                });

                match catch_unwind(AssertUnwindSafe(func)) {
                    Ok(value) => {
                        // A concurrent cancel can win the settle race; the value is
                        // discarded then and the Cancelled state stays sticky.
                        _ = promise.resolve(value);
                        _ = state.compare_exchange(
                            State::Running as u8,
                            State::Completed as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                    }
                    Err(payload) => {
                        warn!("worker closure panicked");
                        _ = promise.reject(pact::Error::user_panic(payload));
                        _ = state.compare_exchange(
                            State::Running as u8,
                            State::Failed as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                    }
                }

                drop(failsafe);
            });

        match spawned {
            Ok(handle) => {
                self.inner.lock().expect(ERR_POISONED_LOCK).handle = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.state.store(State::Failed as u8, Ordering::Release);
                Err(error.into())
            }
        }
    }

    /// Blocks for the worker's result.
    ///
    /// A zero `timeout` blocks until the worker reaches a terminal state. A non-zero
    /// `timeout` fails with [`Error::Timeout`] when it elapses - without cancelling the
    /// worker, unlike [`pact::Future::wait_for`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] on a never-started worker, [`Error::Timeout`] on
    /// deadline expiry, and the worker's own failure or cancellation otherwise.
    pub fn get_result(&self, timeout: Duration) -> Result<R> {
        let future = self.result_future()?;

        if timeout.is_zero() {
            return Ok(future.wait()?);
        }

        future
            .try_wait_for(timeout)?
            .ok_or(Error::Timeout)
    }

    /// Cancels the worker and waits for any in-flight closure to return.
    ///
    /// Best-effort: no cancellation token is injected into user code, so a running
    /// closure finishes on its own time. Join errors are swallowed.
    pub fn cancel(&self) {
        if !self.request_cancel() {
            return;
        }

        // Joining outside the bookkeeping lock; the worker thread never takes it.
        let handle = self.inner.lock().expect(ERR_POISONED_LOCK).handle.take();
        if let Some(handle) = handle {
            _ = handle.join();
        }
    }

    /// Flips the worker into `Cancelled` and fails its waiters, without joining.
    /// Returns true iff this call performed the transition.
    pub(crate) fn request_cancel(&self) -> bool {
        let moved = self
            .state
            .compare_exchange(
                State::Running as u8,
                State::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
            || self
                .state
                .compare_exchange(
                    State::Initial as u8,
                    State::Cancelled as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();

        if moved {
            debug!("worker cancelled");
            if let Some(future) = &self.inner.lock().expect(ERR_POISONED_LOCK).future {
                future.cancel();
            }
        }

        moved
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        State::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether the worker reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the worker thread is currently executing the closure.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == State::Running
    }

    /// Whether cancellation was requested on this worker.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.state() == State::Cancelled
    }

    /// Calls `pred` with the completed result and reports its verdict.
    ///
    /// Returns false when the worker is not done, did not complete with a value, or when
    /// `pred` panics (the panic is swallowed).
    pub fn validate(&self, pred: impl FnOnce(&R) -> bool) -> bool {
        if !self.is_done() {
            return false;
        }

        let Ok(future) = self.result_future() else {
            return false;
        };
        let Ok(Some(value)) = future.try_wait_for(Duration::ZERO) else {
            return false;
        };

        catch_unwind(AssertUnwindSafe(move || pred(&value))).unwrap_or(false)
    }

    /// Stores a callback delivered exactly once with the result when
    /// [`wait_for_completion`][Self::wait_for_completion] observes successful completion.
    pub fn set_callback(&self, callback: impl FnOnce(R) + Send + 'static) {
        self.inner.lock().expect(ERR_POISONED_LOCK).callback = Some(Box::new(callback));
    }

    /// Configures the completion deadline used by
    /// [`wait_for_completion`][Self::wait_for_completion]. Zero means no deadline.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.lock().expect(ERR_POISONED_LOCK).timeout = timeout;
    }

    /// Records the desired thread priority. Effective for threads started afterwards.
    pub fn set_priority(&self, priority: Priority) {
        self.inner.lock().expect(ERR_POISONED_LOCK).hint.priority = priority;
    }

    /// Records the preferred CPU. Effective for threads started afterwards.
    pub fn set_preferred_cpu(&self, cpu: usize) {
        self.inner.lock().expect(ERR_POISONED_LOCK).hint.preferred_cpu = Some(cpu);
    }

    /// The scheduler hint the worker currently carries.
    #[must_use]
    pub fn scheduler_hint(&self) -> SchedulerHint {
        self.inner.lock().expect(ERR_POISONED_LOCK).hint
    }

    /// Polls until the worker reaches a terminal state or the configured timeout
    /// elapses, then delivers the stored callback on success.
    ///
    /// On expiry the worker is cancelled (without joining, so the failure surfaces
    /// within one poll interval of the deadline) and [`Error::Timeout`] is returned.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] on deadline expiry; the worker's own failure or cancellation
    /// otherwise.
    pub fn wait_for_completion(&self) -> Result<R> {
        let timeout = self.inner.lock().expect(ERR_POISONED_LOCK).timeout;
        let started = Instant::now();

        while !self.is_done() {
            if !timeout.is_zero() && started.elapsed() >= timeout {
                self.request_cancel();
                return Err(Error::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let value = self.result_future()?.wait()?;

        let callback = self.inner.lock().expect(ERR_POISONED_LOCK).callback.take();
        if let Some(callback) = callback {
            // Callback panics are swallowed like the rest of the fanout paths.
            let delivered = value.clone();
            _ = catch_unwind(AssertUnwindSafe(move || callback(delivered)));
        }

        Ok(value)
    }

    /// Polls until terminal, bounded by `timeout` (zero = unbounded).
    pub(crate) fn wait_until_done(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();

        while !self.is_done() {
            if !timeout.is_zero() && started.elapsed() >= timeout {
                return Err(Error::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }

        Ok(())
    }

    fn result_future(&self) -> Result<pact::Future<R>> {
        self.inner
            .lock()
            .expect(ERR_POISONED_LOCK)
            .future
            .clone()
            .ok_or_else(|| Error::InvalidArgument("worker was never started".to_string()))
    }
}

impl<R> Default for AsyncWorker<R>
where
    R: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for AsyncWorker<R> {
    fn drop(&mut self) {
        // Detach rather than join: a dropped handle must not block on user code. The
        // slot is cancelled so that any remaining observers fail instead of hanging.
        if self.state.load(Ordering::Acquire) == State::Running as u8 {
            self.state.store(State::Cancelled as u8, Ordering::Release);
            if let Some(future) = &self.inner.lock().expect(ERR_POISONED_LOCK).future {
                future.cancel();
            }
        }
    }
}

impl<R> fmt::Debug for AsyncWorker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWorker")
            .field("state", &State::from_raw(self.state.load(Ordering::Acquire)))
            .finish_non_exhaustive()
    }
}
