// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metronome::Timer;

use crate::{ERR_POISONED_LOCK, MIN_ARM, swallow};

struct DebounceState {
    generation: u64,
    pending: bool,
    burst_started: Option<Instant>,
    last_invoke_at: Option<Instant>,
    call_count: u64,
}

struct DebounceInner {
    func: Box<dyn Fn() + Send + Sync>,
    delay: Duration,
    leading: bool,
    max_wait: Option<Duration>,
    state: Mutex<DebounceState>,
}

impl DebounceInner {
    /// Trailing-timer entry point. Fires only when the arming generation is still
    /// current; superseded arms fall through silently.
    fn fire_if_current(&self, generation: u64) {
        let fire = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            if state.generation == generation && state.pending {
                state.pending = false;
                state.burst_started = None;
                state.last_invoke_at = Some(Instant::now());
                state.call_count += 1;
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

/// Coalesces a burst of calls into one trailing invocation.
///
/// Every [`call`][Self::call] (re)arms a trailing timer `delay` in the future; the
/// wrapped function runs once the burst goes quiet. With [`leading`][Self::leading],
/// the first call of a burst also invokes immediately. With
/// [`max_wait`][Self::max_wait], the trailing invocation is never postponed past that
/// duration from the first call of the burst.
///
/// Calls never block; scheduling rides on the shared timer passed at construction.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use damper::Debouncer;
/// use metronome::Timer;
///
/// let timer = Arc::new(Timer::new());
/// let debouncer = Debouncer::new(&timer, || {}, Duration::from_millis(100)).unwrap();
///
/// debouncer.call();
/// debouncer.flush(); // fire the pending invocation immediately
/// assert_eq!(debouncer.call_count(), 1);
/// ```
pub struct Debouncer {
    inner: Arc<DebounceInner>,
    timer: Arc<Timer>,
}

impl Debouncer {
    /// Wraps `func` for debounced invocation through `timer`.
    ///
    /// # Errors
    ///
    /// [`metronome::Error::InvalidArgument`] for a zero delay (eager validation).
    pub fn new(
        timer: &Arc<Timer>,
        func: impl Fn() + Send + Sync + 'static,
        delay: Duration,
    ) -> metronome::Result<Self> {
        if delay.is_zero() {
            return Err(metronome::Error::InvalidArgument(
                "delay must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(DebounceInner {
                func: Box::new(func),
                delay,
                leading: false,
                max_wait: None,
                state: Mutex::new(DebounceState {
                    generation: 0,
                    pending: false,
                    burst_started: None,
                    last_invoke_at: None,
                    call_count: 0,
                }),
            }),
            timer: Arc::clone(timer),
        })
    }

    /// Also invoke on the leading edge of each burst.
    #[must_use]
    pub fn leading(mut self, leading: bool) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the debouncer is shared")
            .leading = leading;
        self
    }

    /// Never postpone the trailing invocation further than `max_wait` from the first
    /// call of the burst.
    #[must_use]
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("builder methods run before the debouncer is shared")
            .max_wait = Some(max_wait);
        self
    }

    /// Records one call of the burst, (re)arming the trailing timer.
    pub fn call(&self) {
        let now = Instant::now();
        let fire_leading = {
            let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);

            if self.inner.leading && !state.pending {
                state.burst_started = Some(now);
                state.last_invoke_at = Some(now);
                state.call_count += 1;
                self.arm(&mut state, now, now + self.inner.delay);
                true
            } else {
                if state.burst_started.is_none() {
                    state.burst_started = Some(now);
                }

                let mut target = now + self.inner.delay;
                if let (Some(max_wait), Some(burst)) = (self.inner.max_wait, state.burst_started) {
                    target = target.min(burst + max_wait);
                }

                self.arm(&mut state, now, target);
                false
            }
        };

        if fire_leading {
            swallow(|| (self.inner.func)());
        }
    }

    /// Fires the pending invocation immediately, if any.
    pub fn flush(&self) {
        let fire = {
            let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
            if state.pending {
                state.generation += 1;
                state.pending = false;
                state.burst_started = None;
                state.last_invoke_at = Some(Instant::now());
                state.call_count += 1;
                true
            } else {
                false
            }
        };

        if fire {
            swallow(|| (self.inner.func)());
        }
    }

    /// Drops the pending invocation without firing it.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.generation += 1;
        state.pending = false;
        state.burst_started = None;
    }

    /// [`cancel`][Self::cancel], plus counters back to their initial values.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        state.generation += 1;
        state.pending = false;
        state.burst_started = None;
        state.last_invoke_at = None;
        state.call_count = 0;
    }

    /// How many times the wrapped function was invoked.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.inner.state.lock().expect(ERR_POISONED_LOCK).call_count
    }

    fn arm(&self, state: &mut DebounceState, now: Instant, target: Instant) {
        state.generation += 1;
        state.pending = true;

        let generation = state.generation;
        let delay = target.saturating_duration_since(now).max(MIN_ARM);
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

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().expect(ERR_POISONED_LOCK);
        f.debug_struct("Debouncer")
            .field("delay", &self.inner.delay)
            .field("leading", &self.inner.leading)
            .field("max_wait", &self.inner.max_wait)
            .field("pending", &state.pending)
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
        static_assertions::assert_impl_all!(Debouncer: Send, Sync);
    }

    #[test]
    fn zero_delay_is_rejected_eagerly() {
        let timer = Arc::new(Timer::new());
        assert!(Debouncer::new(&timer, || {}, Duration::ZERO).is_err());
    }

    #[test]
    fn a_burst_collapses_into_one_trailing_invocation() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(&timer, counted(&fired), Duration::from_millis(40)).unwrap();

        for _ in 0..5 {
            debouncer.call();
            thread::sleep(Duration::from_millis(5));
        }

        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(debouncer.call_count(), 1);
    }

    #[test]
    fn flush_fires_exactly_once_per_burst() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(&timer, counted(&fired), Duration::from_secs(60)).unwrap();

        for _ in 0..4 {
            debouncer.call();
        }
        debouncer.flush();
        debouncer.flush(); // nothing pending anymore

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_drops_the_pending_invocation() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(&timer, counted(&fired), Duration::from_millis(30)).unwrap();

        debouncer.call();
        debouncer.cancel();

        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn leading_edge_fires_immediately() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(&timer, counted(&fired), Duration::from_millis(30))
            .unwrap()
            .leading(true);

        debouncer.call();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // The trailing edge of the burst still fires.
        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn max_wait_caps_postponement() {
        let timer = Arc::new(Timer::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(&timer, counted(&fired), Duration::from_millis(50))
            .unwrap()
            .max_wait(Duration::from_millis(120));

        // Keep re-arming faster than the delay; without max_wait this would postpone
        // forever.
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(200) {
            debouncer.call();
            thread::sleep(Duration::from_millis(10));
        }

        assert!(fired.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn reset_clears_counters() {
        let timer = Arc::new(Timer::new());
        let debouncer = Debouncer::new(&timer, || {}, Duration::from_secs(60)).unwrap();

        debouncer.call();
        debouncer.flush();
        assert_eq!(debouncer.call_count(), 1);

        debouncer.reset();
        assert_eq!(debouncer.call_count(), 0);
    }

    #[test]
    fn panicking_function_is_swallowed() {
        let timer = Arc::new(Timer::new());
        let debouncer = Debouncer::new(&timer, || panic!("shaped function exploded"), Duration::from_secs(60))
            .unwrap();

        debouncer.call();
        debouncer.flush();
        assert_eq!(debouncer.call_count(), 1);
    }
}
