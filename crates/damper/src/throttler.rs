// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metronome::Timer;

use crate::{ERR_POISONED_LOCK, MIN_ARM, swallow};

struct ThrottleState {
    generation: u64,
    trailing_scheduled: bool,
    pending_since: Option<Instant>,
    last_run_at: Option<Instant>,
    call_count: u64,
}

impl ThrottleState {
    /// Accounts for one invocation happening right now and invalidates any armed
    /// trailing call.
    fn mark_run(&mut self, now: Instant) {
        self.generation += 1;
        self.trailing_scheduled = false;
        self.pending_since = None;
        self.last_run_at = Some(now);
        self.call_count += 1;
    }
}

struct ThrottleInner {
    func: Box<dyn Fn() + Send + Sync>,
    interval: Duration,
    leading: bool,
    max_wait: Option<Duration>,
    state: Mutex<ThrottleState>,
}

impl ThrottleInner {
    fn fire_if_current(&self, generation: u64) {
        let fire = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            if state.generation == generation && state.trailing_scheduled {
                state.mark_run(Instant::now());
                true
            } else {
                false
            }
        };

        if fire {
            swallow(|| (self.func)());
        }
    }
}

/// Lets at most one invocation through per interval, coalescing the rest.
///
/// A call arriving a full interval after the previous run invokes immediately (when
/// [`leading`][Self::leading], the default is trailing-only). Calls inside the interval
/// coalesce into a single trailing invocation at `last run + interval`. With
/// [`max_wait`][Self::max_wait], a call that finds the earliest coalesced caller
/// waiting at least that long force-fires instead of coalescing further.
///
/// Calls never block; scheduling rides on the shared timer passed at construction.
pub struct Throttler {
    inner: Arc<ThrottleInner>,
    timer: Arc<Timer>,
}

impl Throttler {
    /// Wraps `func` for throttled invocation through `timer`.
    ///
    /// # Errors
    ///
    /// [`metronome::Error::InvalidArgument`] for a zero interval (eager validation).
    pub fn new(
        timer: &Arc<Timer>,
        func: impl Fn() + Send + Sync + 'static,
        interval: Duration,
    ) -> metronome::Result<Self> {
        if interval.is_zero() {
            return Err(metronome::Error::InvalidArgument(
                "interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(ThrottleInner {
                func: Box::new(func),
                interval,
                leading: false,
                max_wait: None,
                state: Mutex::new(ThrottleState {
                    generation: 0,
                    trailing_scheduled: false,
                    pending_since: None,
                    last_run_at: None,
                    call_count: 0,
                }),
            }),
            timer: Arc::clone(timer),
        })
    }

    /// Invoke immediately when a call arrives outside the interval.
    #[must_use]
    pub fn leading(mut self, leading: bool) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the throttler is shared")
            .leading = leading;
        self
    }

    /// Force-fire when the earliest coalesced caller has waited at least `max_wait`.
    #[must_use]
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the throttler is shared")
            .max_wait = Some(max_wait);
        self
    }

    /// Records one call, invoking now, coalescing, or force-firing as the interval
    /// dictates.
    pub fn call(&self) {
        let now = Instant::now();
        let fire = {
            let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

            let overdue = matches!(
                (self.inner.max_wait, state.pending_since),
                (Some(max_wait), Some(since)) if state.trailing_scheduled
                    && now.duration_since(since) >= max_wait
            );
            let outside_interval = state
                .last_run_at
                .is_none_or(|last| now.duration_since(last) >= self.inner.interval);

            if overdue || (outside_interval && self.inner.leading && !state.trailing_scheduled) {
                state.mark_run(now);
                true
            } else {
                if !state.trailing_scheduled {
                    let target = state
                        .last_run_at
                        .map_or(now + self.inner.interval, |last| last + self.inner.interval);

                    state.generation += 1;
                    state.trailing_scheduled = true;
                    state.pending_since = Some(now);
                    self.arm(state.generation, target.saturating_duration_since(now).max(MIN_ARM));
                }
                // An already-armed trailing call coalesces this one silently.
                false
            }
        };

        if fire {
            swallow(|| (self.inner.func)());
        }
    }

    /// Fires the coalesced trailing invocation immediately, if any.
    pub fn flush(&self) {
        let fire = {
            let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
            if state.trailing_scheduled {
                state.mark_run(Instant::now());
                true
            } else {
                false
            }
        };

        if fire {
            swallow(|| (self.inner.func)());
        }
    }

    /// Drops the coalesced trailing invocation without firing it.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.generation += 1;
        state.trailing_scheduled = false;
        state.pending_since = None;
    }

    /// [`cancel`][Self::cancel], plus counters back to their initial values.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.generation += 1;
        state.trailing_scheduled = false;
        state.pending_since = None;
        state.last_run_at = None;
        state.call_count = 0;
    }

    /// How many times the wrapped function was invoked.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.inner.state.lock().expect(ERR_POISONED_LOCK).call_count
    }

    fn arm(&self, generation: u64, delay: Duration) {
        let inner = Arc::downgrade(&self.inner);

        // A stopped timer refuses the task; the arm then simply never fires.
        _ = self.timer.set_timeout(
            move || {
                if let Some(inner) = inner.upgrade() {
                    inner.fire_if_current(generation);
                }
            },
            delay,
        );
    }
}

impl fmt::Debug for Throttler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        f.debug_struct("Throttler")
            .field("interval", &self.inner.interval)
            .field("leading", &self.inner.leading)
            .field("max_wait", &self.inner.max_wait)
            .field("trailing_scheduled", &state.trailing_scheduled)
            .field("call_count", &state.call_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    fn counted(counter: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + use<> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Throttler: Send, Sync);
    }

    #[test]
    fn zero_interval_is_rejected_eagerly() {
        let timer = Arc::new(Timer::new());
        assert!(Throttler::new(&timer, || {}, Duration::ZERO).is_err());
    }

    #[test]
    fn burst_coalesces_into_one_trailing_call() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let throttler = Throttler::new(&timer, counted(&fired), Duration::from_millis(50)).unwrap();

        for _ in 0..10 {
            throttler.call();
        }

        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn leading_call_fires_immediately_outside_the_interval() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let throttler = Throttler::new(&timer, counted(&fired), Duration::from_millis(40))
            .unwrap()
            .leading(true);

        throttler.call();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Within the interval: coalesced into a trailing call.
        throttler.call();
        throttler.call();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // A full interval later, the leading edge fires again.
        throttler.call();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn flush_and_cancel_control_the_pending_call() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let throttler = Throttler::new(&timer, counted(&fired), Duration::from_secs(60)).unwrap();

        throttler.call();
        throttler.flush();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        throttler.call();
        throttler.cancel();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn max_wait_force_fires_a_starving_pending_call() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let throttler = Throttler::new(&timer, counted(&fired), Duration::from_secs(60))
            .unwrap()
            .max_wait(Duration::from_millis(50));

        throttler.call(); // arms a trailing call a minute out
        thread::sleep(Duration::from_millis(80));
        throttler.call(); // finds the pending call overdue and force-fires

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_counters_and_history() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let throttler = Throttler::new(&timer, counted(&fired), Duration::from_secs(60))
            .unwrap()
            .leading(true);

        throttler.call();
        assert_eq!(throttler.call_count(), 1);

        throttler.reset();
        assert_eq!(throttler.call_count(), 0);

        // History was cleared, so the next call is a fresh leading edge.
        throttler.call();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(throttler.call_count(), 1);
    }
}
