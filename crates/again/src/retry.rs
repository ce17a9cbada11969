// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::backoff::{BackoffStrategy, next_delay};

type SuccessCallback<R> = Box<dyn Fn(&R) + Send>;
type ExceptionCallback = Box<dyn Fn(&pact::Error) + Send>;
type CompleteCallback = Box<dyn FnOnce() + Send>;

/// A configured retry run over a fallible closure.
///
/// The driver invokes the closure up to `attempts` times; "fallible" means the closure
/// may panic, and each captured panic consumes one attempt. Between attempts the driver
/// sleeps per the configured [`BackoffStrategy`], drawing down a total delay budget.
/// The whole run happens on the shared [`pact::pool`], reporting through the returned
/// future.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use again::{BackoffStrategy, Retry};
///
/// let future = Retry::new(3, Duration::from_millis(10), BackoffStrategy::Fixed, Duration::from_secs(1))
///     .unwrap()
///     .on_complete(|| println!("all attempts accounted for"))
///     .run(|| 42);
///
/// assert_eq!(future.wait().unwrap(), 42);
/// ```
pub struct Retry<R> {
    attempts: u32,
    initial_delay: Duration,
    strategy: BackoffStrategy,
    max_total_delay: Duration,
    on_success: Option<SuccessCallback<R>>,
    on_exception: Option<ExceptionCallback>,
    on_complete: Option<CompleteCallback>,
}

impl<R> Retry<R>
where
    R: Clone + Send + 'static,
{
    /// Configures a retry run.
    ///
    /// # Errors
    ///
    /// [`pact::Error::InvalidArgument`] if `attempts` is not positive. Validation is
    /// eager; nothing runs until [`run`][Self::run].
    pub fn new(
        attempts: i32,
        initial_delay: Duration,
        strategy: BackoffStrategy,
        max_total_delay: Duration,
    ) -> pact::Result<Self> {
        if attempts <= 0 {
            return Err(pact::Error::invalid_argument("attempts must be positive"));
        }

        Ok(Self {
            #[expect(clippy::cast_sign_loss, reason = "positivity was just validated")]
            attempts: attempts as u32,
            initial_delay,
            strategy,
            max_total_delay,
            on_success: None,
            on_exception: None,
            on_complete: None,
        })
    }

    /// Registers a callback invoked with the result of a successful attempt.
    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&R) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Registers a callback invoked with every captured panic, once per failed attempt.
    #[must_use]
    pub fn on_exception(mut self, callback: impl Fn(&pact::Error) + Send + 'static) -> Self {
        self.on_exception = Some(Box::new(callback));
        self
    }

    /// Registers a callback invoked exactly once when the run finishes, successfully or
    /// not.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Starts the run on the shared pool and returns the future of its outcome.
    pub fn run<F>(self, func: F) -> pact::Future<R>
    where
        F: Fn() -> R + Send + 'static,
    {
        let promise = pact::Promise::new();
        let future = promise.future();

        pact::pool().execute(move || self.drive(&func, &promise));

        future
    }

    fn drive<F>(self, func: &F, promise: &pact::Promise<R>)
    where
        F: Fn() -> R,
    {
        let Self {
            attempts,
            initial_delay,
            strategy,
            max_total_delay,
            on_success,
            on_exception,
            mut on_complete,
        } = self;

        let mut budget = max_total_delay;

        for attempt in 1..=attempts {
            match catch_unwind(AssertUnwindSafe(func)) {
                Ok(value) => {
                    if let Some(callback) = &on_success {
                        swallow(|| callback(&value));
                    }
                    if let Some(callback) = on_complete.take() {
                        swallow(callback);
                    }
                    _ = promise.resolve(value);
                    return;
                }
                Err(payload) => {
                    let error = pact::Error::user_panic(payload);
                    debug!(attempt, attempts, "retry attempt failed");

                    if let Some(callback) = &on_exception {
                        swallow(|| callback(&error));
                    }

                    if attempt == attempts || budget.is_zero() {
                        if let Some(callback) = on_complete.take() {
                            swallow(callback);
                        }
                        _ = promise.reject(error);
                        return;
                    }

                    let delay = next_delay(strategy, initial_delay, attempt, attempts, budget);
                    debug!(?delay, "backing off before the next attempt");
                    thread::sleep(delay);
                    budget = budget.saturating_sub(delay);
                }
            }
        }
    }
}

impl<R> fmt::Debug for Retry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts)
            .field("initial_delay", &self.initial_delay)
            .field("strategy", &self.strategy)
            .field("max_total_delay", &self.max_total_delay)
            .finish_non_exhaustive()
    }
}

/// Runs a closure with bounded retries and backoff, without callbacks.
///
/// Shorthand for [`Retry::new`] + [`Retry::run`]; see [`Retry`] for the algorithm.
///
/// # Errors
///
/// [`pact::Error::InvalidArgument`] if `attempts` is not positive (validated eagerly).
pub fn async_retry<R, F>(
    func: F,
    attempts: i32,
    initial_delay: Duration,
    strategy: BackoffStrategy,
    max_total_delay: Duration,
) -> pact::Result<pact::Future<R>>
where
    R: Clone + Send + 'static,
    F: Fn() -> R + Send + 'static,
{
    Ok(Retry::new(attempts, initial_delay, strategy, max_total_delay)?.run(func))
}

/// Runs a user callback, swallowing panics so bookkeeping continues.
fn swallow(callback: impl FnOnce()) {
    _ = catch_unwind(AssertUnwindSafe(callback));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Retry<i32>: Send);
    }

    #[test]
    fn first_attempt_success_skips_the_backoff() {
        let future = async_retry(
            || 42,
            5,
            Duration::from_secs(60),
            BackoffStrategy::Fixed,
            Duration::from_secs(3600),
        )
        .unwrap();

        assert_eq!(future.try_wait_for(TEST_TIMEOUT).unwrap(), Some(42));
    }

    #[test]
    fn attempts_bound_the_invocations_exactly() {
        let calls = Arc::new(AtomicUsize::new(0));

        let future = async_retry(
            {
                let calls = Arc::clone(&calls);
                move || -> i32 {
                    calls.fetch_add(1, Ordering::SeqCst);
                    panic!("always failing");
                }
            },
            3,
            Duration::from_millis(1),
            BackoffStrategy::Fixed,
            Duration::from_secs(1),
        )
        .unwrap();

        assert!(matches!(
            future.try_wait_for(TEST_TIMEOUT),
            Err(pact::Error::UserPanic(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_positive_attempts_fail_eagerly() {
        assert!(matches!(
            async_retry(
                || 1,
                0,
                Duration::ZERO,
                BackoffStrategy::Fixed,
                Duration::ZERO
            ),
            Err(pact::Error::InvalidArgument(_))
        ));
        assert!(matches!(
            Retry::<i32>::new(-2, Duration::ZERO, BackoffStrategy::Fixed, Duration::ZERO),
            Err(pact::Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn callbacks_fire_with_the_documented_cardinality() {
        let successes = Arc::new(AtomicUsize::new(0));
        let exceptions = Arc::new(AtomicUsize::new(0));
        let completions = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let future = Retry::new(
            3,
            Duration::from_millis(1),
            BackoffStrategy::Fixed,
            Duration::from_secs(1),
        )
        .unwrap()
        .on_success({
            let successes = Arc::clone(&successes);
            move |value: &i32| {
                assert_eq!(*value, 42);
                successes.fetch_add(1, Ordering::SeqCst);
            }
        })
        .on_exception({
            let exceptions = Arc::clone(&exceptions);
            move |_| {
                exceptions.fetch_add(1, Ordering::SeqCst);
            }
        })
        .on_complete({
            let completions = Arc::clone(&completions);
            move || {
                completions.fetch_add(1, Ordering::SeqCst);
            }
        })
        .run({
            let calls = Arc::clone(&calls);
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("transient");
                }
                42
            }
        });

        assert_eq!(future.try_wait_for(TEST_TIMEOUT).unwrap(), Some(42));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(exceptions.load(Ordering::SeqCst), 2);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_budget_short_circuits_further_sleeps() {
        let calls = Arc::new(AtomicUsize::new(0));

        let future = async_retry(
            {
                let calls = Arc::clone(&calls);
                move || -> i32 {
                    calls.fetch_add(1, Ordering::SeqCst);
                    panic!("always failing");
                }
            },
            10,
            Duration::from_millis(50),
            BackoffStrategy::Fixed,
            // The first sleep consumes the whole budget; the second failure gives up.
            Duration::from_millis(50),
        )
        .unwrap();

        assert!(matches!(
            future.try_wait_for(TEST_TIMEOUT),
            Err(pact::Error::UserPanic(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_callbacks_do_not_break_the_run() {
        let future = Retry::new(
            2,
            Duration::from_millis(1),
            BackoffStrategy::Fixed,
            Duration::from_secs(1),
        )
        .unwrap()
        .on_success(|_: &i32| panic!("observer exploded"))
        .on_complete(|| panic!("observer exploded"))
        .run(|| 7);

        assert_eq!(future.try_wait_for(TEST_TIMEOUT).unwrap(), Some(7));
    }
}
