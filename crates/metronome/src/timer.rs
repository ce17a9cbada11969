// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::task::{Repeat, ScheduledTask};

/// How long a paused dispatcher sleeps between state checks.
const PAUSE_POLL: Duration = Duration::from_millis(100);

type TickCallback = Arc<dyn Fn() + Send + Sync>;

struct TimerState {
    tasks: Vec<ScheduledTask>,
    next_seq: u64,
    paused: bool,
    stopped: bool,
    executing: bool,
    tick_callback: Option<TickCallback>,
}

struct TimerShared {
    state: Mutex<TimerState>,
    signal: Condvar,
}

/// A priority timer with one dedicated dispatcher thread.
///
/// Tasks are ranked by `(priority, next fire time, insertion order)`, lower priority
/// values first; among *due* tasks the best-ranked one runs next, and a due task never
/// waits behind a higher-ranked task that is not due yet. No two tasks execute
/// concurrently within one timer instance.
///
/// Dropping the timer stops the dispatcher and joins it; queued tasks that never fired
/// are discarded (one-shot futures then report [`pact::Error::BrokenPromise`]).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use metronome::Timer;
///
/// let timer = Timer::new();
/// let future = timer.set_timeout(|| 2 + 2, Duration::from_millis(5)).unwrap();
///
/// assert_eq!(future.wait().unwrap(), 4);
/// ```
pub struct Timer {
    shared: Arc<TimerShared>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Timer {
    /// Creates a timer and starts its dispatcher thread.
    ///
    /// # Panics
    ///
    /// Panics if the dispatcher thread cannot be spawned.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                tasks: Vec::new(),
                next_seq: 0,
                paused: false,
                stopped: false,
                executing: false,
                tick_callback: None,
            }),
            signal: Condvar::new(),
        });

        let dispatcher = thread::Builder::new()
            .name("metronome-dispatcher".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || dispatch(&shared)
            })
            .expect("dispatcher thread can be spawned");

        Self {
            shared,
            dispatcher: Some(dispatcher),
        }
    }

    /// Schedules a one-shot job and returns the future of its result.
    ///
    /// The job runs once, `delay` from now, at priority 0.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a zero delay, [`Error::Stopped`] after `stop()`.
    pub fn set_timeout<R, F>(&self, func: F, delay: Duration) -> Result<pact::Future<R>>
    where
        R: Clone + Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        validate_delay(delay)?;

        let task = chore::PackagedTask::new(func);
        let future = task.future();

        self.add_task(
            Box::new(move || {
                // One-shot: a second fire cannot happen, so the invoke-once error is
                // unreachable here.
                _ = task.invoke();
            }),
            delay,
            Repeat::Times(1),
            0,
        )?;

        Ok(future)
    }

    /// Schedules a repeating job.
    ///
    /// The job first fires `interval` from now and then every `interval`, at the given
    /// priority. A `repeat_count` of -1 repeats until cancellation; a count of zero is
    /// accepted and schedules nothing.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a zero interval or a repeat count below -1,
    /// [`Error::Stopped`] after `stop()`.
    pub fn set_interval<F>(
        &self,
        func: F,
        interval: Duration,
        repeat_count: i32,
        priority: i32,
    ) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        validate_delay(interval)?;
        if repeat_count < -1 {
            return Err(Error::invalid_argument("repeat_count must be >= -1"));
        }

        let remaining = Repeat::from_count(repeat_count);
        if remaining == Repeat::Times(0) {
            return Ok(());
        }

        self.add_task(Box::new(func), interval, remaining, priority)
    }

    /// The timer's notion of "now".
    #[must_use]
    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Empties the queue and wakes the dispatcher. The currently executing task (if
    /// any) completes normally.
    pub fn cancel_all_tasks(&self) {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        state.tasks.clear();
        self.shared.signal.notify_all();
    }

    /// Pauses dispatch. Due tasks accumulate until [`resume`][Self::resume].
    pub fn pause(&self) {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).paused = true;
        self.shared.signal.notify_all();
    }

    /// Resumes dispatch.
    pub fn resume(&self) {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).paused = false;
        self.shared.signal.notify_all();
    }

    /// Stops the dispatcher. Stopping is sticky: queued tasks are abandoned and
    /// scheduling fails with [`Error::Stopped`] from now on.
    pub fn stop(&self) {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).stopped = true;
        self.shared.signal.notify_all();
    }

    /// Blocks until the queue is empty and no task is executing (or the timer stops).
    pub fn wait(&self) {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);

        while !(state.tasks.is_empty() && !state.executing) && !state.stopped {
            state = self.shared.signal.wait(state).expect(ERR_POISONED_LOCK);
        }
    }

    /// Installs a tick callback, invoked after every task execution. A panicking
    /// callback is swallowed.
    pub fn set_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).tick_callback = Some(Arc::new(callback));
    }

    /// The number of queued tasks (not counting one currently executing).
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.shared.state.lock().expect(ERR_POISONED_LOCK).tasks.len()
    }

    fn add_task(
        &self,
        job: Box<dyn FnMut() + Send>,
        delay: Duration,
        remaining: Repeat,
        priority: i32,
    ) -> Result<()> {
        let mut state = self.shared.state.lock().expect(ERR_POISONED_LOCK);

        if state.stopped {
            return Err(Error::Stopped);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.push(ScheduledTask {
            job,
            delay,
            remaining,
            priority,
            next_fire_at: Instant::now() + delay,
            seq,
        });
        self.shared.signal.notify_all();

        Ok(())
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
        if let Some(dispatcher) = self.dispatcher.take() {
            _ = dispatcher.join();
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock().expect(ERR_POISONED_LOCK);
        f.debug_struct("Timer")
            .field("task_count", &state.tasks.len())
            .field("paused", &state.paused)
            .field("stopped", &state.stopped)
            .finish()
    }
}

fn validate_delay(delay: Duration) -> Result<()> {
    if delay.is_zero() {
        return Err(Error::invalid_argument("delay must be greater than zero"));
    }

    Ok(())
}

/// Index of the best-ranked task that is due at `now`, if any.
fn select_due(tasks: &[ScheduledTask], now: Instant) -> Option<usize> {
    tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.next_fire_at <= now)
        .min_by_key(|(_, task)| task.rank())
        .map(|(index, _)| index)
}

/// The earliest fire time across all queued tasks - the dispatcher's sleep deadline.
/// Deliberately not the queue head: a due low-rank task must not wait behind a
/// higher-ranked task that fires later.
fn earliest_fire(tasks: &[ScheduledTask]) -> Option<Instant> {
    tasks.iter().map(|task| task.next_fire_at).min()
}

#[cfg_attr(test, mutants::skip)] // Critical dispatch loop - causes test timeouts if tampered.
fn dispatch(shared: &TimerShared) {
    let mut state = shared.state.lock().expect(ERR_POISONED_LOCK);

    loop {
        if state.stopped {
            // Unblock anyone parked in wait().
            shared.signal.notify_all();
            return;
        }

        if state.paused {
            state = shared.signal.wait_timeout(state, PAUSE_POLL).expect(ERR_POISONED_LOCK).0;
            continue;
        }

        let now = Instant::now();
        if let Some(index) = select_due(&state.tasks, now) {
            let mut task = state.tasks.swap_remove(index);
            state.executing = true;
            let tick = state.tick_callback.clone();
            drop(state);

            if catch_unwind(AssertUnwindSafe(|| (task.job)())).is_err() {
                warn!(seq = task.seq, "scheduled task panicked");
            }
            if let Some(tick) = tick {
                _ = catch_unwind(AssertUnwindSafe(|| tick()));
            }

            state = shared.state.lock().expect(ERR_POISONED_LOCK);
            state.executing = false;
            if !state.stopped && task.reschedule(Instant::now()) {
                state.tasks.push(task);
            }
            if state.tasks.is_empty() {
                // The queue drained; release wait()ers.
                shared.signal.notify_all();
            }
        } else {
            match earliest_fire(&state.tasks) {
                Some(fire_at) => {
                    let now = Instant::now();
                    if fire_at > now {
                        state = shared
                            .signal
                            .wait_timeout(state, fire_at - now)
                            .expect(ERR_POISONED_LOCK)
                            .0;
                    }
                }
                None => {
                    shared.signal.notify_all();
                    state = shared.signal.wait(state).expect(ERR_POISONED_LOCK);
                }
            }
        }
    }
}
