// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::worker::AsyncWorker;

/// How many times worker registration retries before giving up.
const INSERT_ATTEMPTS: u32 = 5;

/// An owning container of workers with bulk operations over them.
///
/// The manager offers no ordering guarantees across its workers. Bulk operations
/// snapshot the container first, so no lock is held while blocking on worker state.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use crew::AsyncWorkerManager;
///
/// let manager = AsyncWorkerManager::new();
/// let worker = manager.create_worker(|| 21 * 2).unwrap();
///
/// manager.wait_for_all(Duration::ZERO).unwrap();
/// assert_eq!(worker.get_result(Duration::ZERO).unwrap(), 42);
/// ```
pub struct AsyncWorkerManager<R> {
    workers: Mutex<Vec<Arc<AsyncWorker<R>>>>,
}

impl<R> AsyncWorkerManager<R>
where
    R: Clone + Send + 'static,
{
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Constructs a worker, starts it, and registers it with the container.
    ///
    /// Registration uses bounded retries: up to five `try_lock` attempts with
    /// exponential microsecond backoff before the call gives up. The worker keeps
    /// running either way; on registration failure the returned error means only that
    /// the manager does not own it.
    ///
    /// # Errors
    ///
    /// Start failures from [`AsyncWorker::start_async`], or [`Error::Registration`]
    /// after the bounded insertion retries.
    pub fn create_worker<F>(&self, func: F) -> Result<Arc<AsyncWorker<R>>>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let worker = Arc::new(AsyncWorker::new());
        worker.start_async(func)?;

        for attempt in 0..INSERT_ATTEMPTS {
            if let Ok(mut workers) = self.workers.try_lock() {
                workers.push(Arc::clone(&worker));
                return Ok(worker);
            }

            thread::sleep(Duration::from_micros(1 << attempt));
        }

        debug!("worker registration gave up after bounded retries");
        Err(Error::Registration)
    }

    /// Cancels every registered worker, joining in-flight closures one by one.
    pub fn cancel_all(&self) {
        for worker in self.snapshot() {
            worker.cancel();
        }
    }

    /// Whether every registered worker reached a terminal state.
    #[must_use]
    pub fn all_done(&self) -> bool {
        self.snapshot().iter().all(|worker| worker.is_done())
    }

    /// Blocks until every registered worker reaches a terminal state.
    ///
    /// `per_timeout` bounds the wait for each individual worker (zero = unbounded).
    /// A failed or cancelled worker still counts as done.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] as soon as one worker exceeds its per-worker deadline.
    pub fn wait_for_all(&self, per_timeout: Duration) -> Result<()> {
        for worker in self.snapshot() {
            worker.wait_until_done(per_timeout)?;
        }

        Ok(())
    }

    /// Whether the given worker reached a terminal state.
    #[must_use]
    pub fn is_done(&self, worker: &Arc<AsyncWorker<R>>) -> bool {
        worker.is_done()
    }

    /// Cancels the given worker.
    pub fn cancel(&self, worker: &Arc<AsyncWorker<R>>) {
        worker.cancel();
    }

    /// The number of registered workers, pruned or not.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Drops every worker that reached a terminal state and returns how many were
    /// removed.
    pub fn prune_completed_workers(&self) -> usize {
        let mut workers = self.workers.lock().expect(ERR_POISONED_LOCK);
        let before = workers.len();
        workers.retain(|worker| !worker.is_done());

        before - workers.len()
    }

    fn snapshot(&self) -> Vec<Arc<AsyncWorker<R>>> {
        self.workers.lock().expect(ERR_POISONED_LOCK).clone()
    }
}

impl<R> Default for AsyncWorkerManager<R>
where
    R: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for AsyncWorkerManager<R>
where
    R: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWorkerManager")
            .field("size", &self.size())
            .finish()
    }
}
