// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::settings::Settings;

/// A parked caller awaiting its (always-failing) release.
struct Waiter {
    released: Mutex<bool>,
    signal: Condvar,
}

impl Waiter {
    fn new() -> Self {
        Self {
            released: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut released = self.released.lock().expect(ERR_POISONED_LOCK);
        while !*released {
            released = self.signal.wait(released).expect(ERR_POISONED_LOCK);
        }
    }

    fn release(&self) {
        *self.released.lock().expect(ERR_POISONED_LOCK) = true;
        self.signal.notify_all();
    }
}

#[derive(Default)]
struct KeyState {
    settings: Settings,
    requests: VecDeque<Instant>,
    waiters: VecDeque<Arc<Waiter>>,
    rejected: u64,
}

impl KeyState {
    /// Drops request timestamps that slid out of the window. Afterwards the deque never
    /// holds more than `max_requests` live entries.
    fn cleanup(&mut self, now: Instant) {
        let cutoff = now.checked_sub(self.settings.window());
        while let Some(oldest) = self.requests.front() {
            match cutoff {
                Some(cutoff) if *oldest < cutoff => _ = self.requests.pop_front(),
                _ => break,
            }
        }
    }

    /// Moves waiters into request slots while capacity allows, FIFO. Returns the
    /// drained waiters; the caller wakes them after releasing the shard.
    fn drain_capacity(&mut self, now: Instant) -> Vec<Arc<Waiter>> {
        self.cleanup(now);

        let mut drained = Vec::new();
        while self.requests.len() < self.settings.max_requests() {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            self.requests.push_back(now);
            drained.push(waiter);
        }

        drained
    }

    /// Unconditionally empties the waiter queue (shutdown/reset path).
    fn drain_all(&mut self) -> Vec<Arc<Waiter>> {
        self.waiters.drain(..).collect()
    }
}

/// A per-key sliding-window rate limiter.
///
/// Within-budget calls to [`acquire`][Self::acquire] proceed immediately. Over-limit
/// calls - and every call while the limiter is paused - are counted as rejected, parked
/// FIFO, and surface [`Error::RateLimitExceeded`] when drained. Keys are configured with
/// [`set_function_limit`][Self::set_function_limit] or fall back to the default budget
/// of 5 requests per second, installed on first touch.
///
/// # Thread safety
///
/// Key state lives in sharded concurrent maps; unrelated keys do not contend. Waiter
/// wakeups always happen after the shard is released.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use floodgate::RateLimiter;
///
/// let limiter = RateLimiter::new();
/// limiter.set_function_limit("ingest", 100, Duration::from_secs(1)).unwrap();
/// limiter.acquire("ingest").unwrap();
/// ```
pub struct RateLimiter {
    keys: DashMap<String, KeyState, ahash::RandomState>,
    paused: AtomicBool,
}

impl RateLimiter {
    /// Creates a limiter with no configured keys.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: DashMap::with_hasher(ahash::RandomState::new()),
            paused: AtomicBool::new(false),
        }
    }

    /// Creates a limiter pre-sized for roughly `capacity` distinct keys. Purely a
    /// performance hint; semantics are identical to [`new`][Self::new].
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: DashMap::with_capacity_and_hasher(capacity, ahash::RandomState::new()),
            paused: AtomicBool::new(false),
        }
    }

    /// Admits or rejects one call under `key`, suspending rejected callers.
    ///
    /// Within budget, the call is recorded and proceeds immediately. Over budget (or
    /// while paused), the call is counted as rejected and the thread parks until the
    /// waiter queue is drained; the call then fails.
    ///
    /// # Errors
    ///
    /// [`Error::RateLimitExceeded`] after the parked caller is released.
    pub fn acquire(&self, key: &str) -> Result<()> {
        let waiter = {
            let mut entry = self.keys.entry(key.to_string()).or_default();
            let state = entry.value_mut();
            let now = Instant::now();
            state.cleanup(now);

            if self.paused.load(Ordering::Acquire)
                || state.requests.len() >= state.settings.max_requests()
            {
                let waiter = Arc::new(Waiter::new());
                state.waiters.push_back(Arc::clone(&waiter));
                state.rejected += 1;
                warn!(key, rejected = state.rejected, "request rejected");
                Some(waiter)
            } else {
                state.requests.push_back(now);
                None
            }
        };

        match waiter {
            Some(waiter) => {
                // Parked outside the shard lock; released by resume/reset/drop.
                waiter.park();
                Err(Error::RateLimitExceeded {
                    key: key.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    /// Acquires a sequence of keys in order, stopping at the first rejection.
    ///
    /// # Errors
    ///
    /// The first [`Error::RateLimitExceeded`] among the keys, if any.
    pub fn acquire_batch<I, K>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            self.acquire(key.as_ref())?;
        }

        Ok(())
    }

    /// Installs a validated budget for `key`, replacing any previous one. Existing
    /// request history and waiters are untouched.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a zero budget or zero window (eager validation).
    pub fn set_function_limit(
        &self,
        key: &str,
        max_requests: usize,
        window: std::time::Duration,
    ) -> Result<()> {
        let settings = Settings::new(max_requests, window)?;
        debug!(key, max_requests, ?window, "limit configured");

        self.keys.entry(key.to_string()).or_default().settings = settings;
        Ok(())
    }

    /// Installs budgets for a batch of keys. Each [`Settings`] was validated at
    /// construction, so the batch cannot fail halfway.
    pub fn set_function_limits<I, K>(&self, batch: I)
    where
        I: IntoIterator<Item = (K, Settings)>,
        K: Into<String>,
    {
        for (key, settings) in batch {
            self.keys.entry(key.into()).or_default().settings = settings;
        }
    }

    /// Pauses the limiter: every subsequent `acquire` parks as if over budget, until
    /// [`resume`][Self::resume].
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Unpauses the limiter and drains parked waiters per key, FIFO, while capacity
    /// allows. Each drained waiter consumes a request slot and then fails on its own
    /// thread; wakeups happen outside the shard locks.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);

        let mut to_wake = Vec::new();
        for mut entry in self.keys.iter_mut() {
            to_wake.extend(entry.value_mut().drain_capacity(Instant::now()));
        }

        for waiter in to_wake {
            waiter.release();
        }
    }

    /// The number of rejected calls recorded under `key` since the last reset.
    #[must_use]
    pub fn rejected_requests(&self, key: &str) -> u64 {
        self.keys.get(key).map_or(0, |entry| entry.rejected)
    }

    /// Clears the request history and rejection counter of one key and releases all of
    /// its parked waiters. The key's configured budget is kept.
    pub fn reset_function(&self, key: &str) {
        let drained = self.keys.get_mut(key).map(|mut entry| {
            let state = entry.value_mut();
            state.requests.clear();
            state.rejected = 0;
            state.drain_all()
        });

        for waiter in drained.into_iter().flatten() {
            waiter.release();
        }
    }

    /// [`reset_function`][Self::reset_function] across every known key.
    pub fn reset_all(&self) {
        let mut to_wake = Vec::new();
        for mut entry in self.keys.iter_mut() {
            let state = entry.value_mut();
            state.requests.clear();
            state.rejected = 0;
            to_wake.extend(state.drain_all());
        }

        for waiter in to_wake {
            waiter.release();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        // No caller may stay parked behind a limiter that is going away.
        let mut to_wake = Vec::new();
        for mut entry in self.keys.iter_mut() {
            to_wake.extend(entry.value_mut().drain_all());
        }

        for waiter in to_wake {
            waiter.release();
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("keys", &self.keys.len())
            .field("paused", &self.paused.load(Ordering::Acquire))
            .finish()
    }
}
