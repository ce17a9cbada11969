// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};

/// The variant stored in a slot. Once it leaves `Empty` it never changes again.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    /// No terminal transition has happened yet.
    Empty,

    /// The producer resolved the slot with a value.
    Value(T),

    /// The producer rejected the slot (or it broke, or a continuation failed).
    Error(Error),

    /// The slot was cancelled before a value or error arrived.
    Cancelled,
}

/// A snapshot of a terminal outcome, handed to continuation edges after the transition.
///
/// Each edge receives its own clone of the value, so edges can consume it freely.
#[derive(Debug)]
pub(crate) enum Settled<T> {
    Value(T),
    Error(Error),
    Cancelled,
}

type ValueCallback<T> = Box<dyn FnOnce(T) + Send>;
type Edge<T> = Box<dyn FnOnce(Settled<T>) + Send>;

/// The single-writer, multiple-reader cell backing a promise/future pair.
///
/// # Thread safety
///
/// All transitions happen under the internal mutex, but callbacks and edges are always
/// invoked after the lock is released, using a take-and-iterate pattern. The one thread
/// that performs the terminal transition drains both lists.
pub(crate) struct SharedSlot<T> {
    state: Mutex<SlotState<T>>,
    settled: Condvar,
}

struct SlotState<T> {
    outcome: Outcome<T>,
    cancelled: bool,
    callbacks: Vec<ValueCallback<T>>,
    edges: Vec<Edge<T>>,
}

impl<T> SharedSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                outcome: Outcome::Empty,
                cancelled: false,
                callbacks: Vec::new(),
                edges: Vec::new(),
            }),
            settled: Condvar::new(),
        }
    }

    /// Whether the slot holds a terminal outcome.
    pub fn is_completed(&self) -> bool {
        !matches!(
            self.state.lock().expect(ERR_POISONED_LOCK).outcome,
            Outcome::Empty
        )
    }

    /// Whether cancellation was requested, regardless of what the slot completed with.
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().expect(ERR_POISONED_LOCK).cancelled
    }

    /// The stored error, if the slot settled with one.
    pub fn error(&self) -> Option<Error> {
        match &self.state.lock().expect(ERR_POISONED_LOCK).outcome {
            Outcome::Error(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Rejects the slot. Callbacks are dropped silently; edges observe the error.
    pub fn reject(&self, error: Error) -> Result<()> {
        let (callbacks, edges) = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            if state.cancelled {
                return Err(Error::Cancelled);
            }
            if !matches!(state.outcome, Outcome::Empty) {
                return Err(Error::AlreadySettled);
            }

            state.outcome = Outcome::Error(error.clone());
            self.settled.notify_all();
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.edges),
            )
        };

        drop(callbacks);
        for edge in edges {
            run_edge(edge, Settled::Error(error.clone()));
        }

        Ok(())
    }

    /// Requests cancellation. Returns true iff this call performed the transition.
    ///
    /// If the slot is still empty it also completes as `Cancelled`, waking waiters and
    /// notifying edges. If the slot already settled, only the cancellation bit is set and
    /// the stored outcome is untouched.
    #[cfg_attr(test, mutants::skip)] // Critical primitive - causes test timeouts if tampered.
    pub fn cancel(&self) -> bool {
        let edges = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            if state.cancelled {
                return false;
            }
            state.cancelled = true;

            if matches!(state.outcome, Outcome::Empty) {
                state.outcome = Outcome::Cancelled;
                self.settled.notify_all();
                state.callbacks.clear();
                std::mem::take(&mut state.edges)
            } else {
                Vec::new()
            }
        };

        for edge in edges {
            run_edge(edge, Settled::Cancelled);
        }

        true
    }

    /// Breaks the slot because its producer was dropped without settling it.
    pub fn broken(&self) {
        let edges = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            if !matches!(state.outcome, Outcome::Empty) {
                return;
            }

            state.outcome = Outcome::Error(Error::BrokenPromise);
            self.settled.notify_all();
            state.callbacks.clear();
            std::mem::take(&mut state.edges)
        };

        for edge in edges {
            run_edge(edge, Settled::Error(Error::BrokenPromise));
        }
    }
}

impl<T> SharedSlot<T>
where
    T: Clone + Send + 'static,
{
    /// Resolves the slot with a value and fans it out.
    ///
    /// Callbacks run first, in registration order; a panicking callback does not prevent
    /// the remaining ones from running. Continuation edges run afterwards.
    #[cfg_attr(test, mutants::skip)] // Critical primitive - causes test timeouts if tampered.
    pub fn resolve(&self, value: T) -> Result<()> {
        let (callbacks, edges) = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            if state.cancelled {
                return Err(Error::Cancelled);
            }
            if !matches!(state.outcome, Outcome::Empty) {
                return Err(Error::AlreadySettled);
            }

            state.outcome = Outcome::Value(value.clone());
            self.settled.notify_all();
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.edges),
            )
        };

        for callback in callbacks {
            run_callback(callback, value.clone());
        }
        for edge in edges {
            run_edge(edge, Settled::Value(value.clone()));
        }

        Ok(())
    }

    /// Blocks until the slot settles, then surfaces the outcome.
    #[cfg_attr(test, mutants::skip)] // Critical primitive - causes test timeouts if tampered.
    pub fn wait(&self) -> Result<T> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        loop {
            match &state.outcome {
                Outcome::Empty => {}
                Outcome::Value(value) => return Ok(value.clone()),
                Outcome::Error(error) => return Err(error.clone()),
                Outcome::Cancelled => return Err(Error::Cancelled),
            }

            state = self.settled.wait(state).expect(ERR_POISONED_LOCK);
        }
    }

    /// Blocks until the slot settles or the timeout elapses. Timing out returns `Ok(None)`
    /// and leaves the slot untouched; cancellation-on-timeout is a policy of the caller.
    pub fn wait_deadline(&self, timeout: Duration) -> Result<Option<T>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // The deadline is beyond representable time, which is as good as no deadline.
            return self.wait().map(Some);
        };

        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        loop {
            match &state.outcome {
                Outcome::Empty => {}
                Outcome::Value(value) => return Ok(Some(value.clone())),
                Outcome::Error(error) => return Err(error.clone()),
                Outcome::Cancelled => return Err(Error::Cancelled),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = self
                .settled
                .wait_timeout(state, deadline - now)
                .expect(ERR_POISONED_LOCK);
            state = guard;
        }
    }

    /// Registers a completion callback.
    ///
    /// If the slot already holds a value the callback runs immediately on the registering
    /// thread. If the slot errored or was cancelled, the callback is dropped silently.
    pub fn on_complete(&self, callback: impl FnOnce(T) + Send + 'static) {
        let value = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            match &state.outcome {
                Outcome::Empty => {
                    state.callbacks.push(Box::new(callback));
                    return;
                }
                Outcome::Value(value) => value.clone(),
                Outcome::Error(_) | Outcome::Cancelled => return,
            }
        };

        run_callback(Box::new(callback), value);
    }

    /// Registers a continuation edge that observes whichever terminal outcome arrives.
    ///
    /// Edges are an internal mechanism: `then`, `catching`, `retry`, and the gathering
    /// helpers are all built on them. If the slot is already terminal, the edge runs
    /// immediately on the registering thread.
    pub fn on_settled(&self, edge: Edge<T>) {
        let snapshot = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            match &state.outcome {
                Outcome::Empty => {
                    state.edges.push(edge);
                    return;
                }
                Outcome::Value(value) => Settled::Value(value.clone()),
                Outcome::Error(error) => Settled::Error(error.clone()),
                Outcome::Cancelled => Settled::Cancelled,
            }
        };

        run_edge(edge, snapshot);
    }
}

/// Runs a user callback, swallowing panics so the remaining fanout proceeds.
fn run_callback<T>(callback: ValueCallback<T>, value: T) {
    _ = catch_unwind(AssertUnwindSafe(move || callback(value)));
}

/// Runs a continuation edge, swallowing panics. Edges settle their own downstream slot
/// before anything that could unwind, so a panic here cannot lose a result.
fn run_edge<T>(edge: Edge<T>, settled: Settled<T>) {
    _ = catch_unwind(AssertUnwindSafe(move || edge(settled)));
}
