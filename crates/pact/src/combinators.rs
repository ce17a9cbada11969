// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use threadpool::ThreadPool;

use crate::ERR_POISONED_LOCK;
use crate::error::Error;
use crate::future::Future;
use crate::promise::Promise;
use crate::slot::Settled;

static SHARED_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// Returns a handle to the process-wide worker pool used by [`spawn`] and
/// [`parallel_process`].
///
/// The pool is created lazily on first use with one worker per available processor and
/// lives until process exit. It exists to bound the thread count of fire-and-forget work;
/// nothing in the public API requires going through it.
#[must_use]
pub fn pool() -> ThreadPool {
    SHARED_POOL
        .get_or_init(|| {
            let workers = thread::available_parallelism().map_or(4, |n| n.get());
            ThreadPool::with_name("pact-pool".to_string(), workers)
        })
        .clone()
}

/// Runs `func` on the shared pool and returns a future observing its outcome.
///
/// A panic inside `func` rejects the future with [`Error::UserPanic`].
///
/// # Example
///
/// ```
/// let future = pact::spawn(|| 6 * 7);
/// assert_eq!(future.wait().unwrap(), 42);
/// ```
pub fn spawn<R, F>(func: F) -> Future<R>
where
    R: Clone + Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let promise = Promise::new();
    let future = promise.future();

    pool().execute(move || match catch_unwind(AssertUnwindSafe(func)) {
        Ok(value) => _ = promise.resolve(value),
        Err(payload) => _ = promise.reject(Error::user_panic(payload)),
    });

    future
}

struct Gather<T> {
    outcomes: Vec<Option<Settled<T>>>,
    remaining: usize,
}

/// Gathers a collection of futures into a single future of all their values.
///
/// The output completes once every input has settled; the result vector preserves input
/// order. When inputs settle abnormally, the earliest input index decides the outcome:
/// an error there rejects the output with that error, a cancellation there cancels it.
/// An empty input resolves immediately with an empty vector.
pub fn when_all<T, I>(futures: I) -> Future<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let futures: Vec<Future<T>> = futures.into_iter().collect();
    let promise = Promise::new();
    let gathered = promise.future();

    if futures.is_empty() {
        _ = promise.resolve(Vec::new());
        return gathered;
    }

    let count = futures.len();
    let gather = Arc::new(Mutex::new(Gather {
        outcomes: (0..count).map(|_| None).collect(),
        remaining: count,
    }));
    let promise = Arc::new(promise);

    for (index, future) in futures.iter().enumerate() {
        let gather = Arc::clone(&gather);
        let promise = Arc::clone(&promise);

        future.on_settled_edge(Box::new(move |settled| {
            let outcomes = {
                let mut state = gather.lock().expect(ERR_POISONED_LOCK);

                state.outcomes[index] = Some(settled);
                state.remaining -= 1;
                if state.remaining > 0 {
                    return;
                }

                mem::take(&mut state.outcomes)
            };

            let mut values = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                match outcome.expect("every input has settled by the time the last edge runs") {
                    Settled::Value(value) => values.push(value),
                    Settled::Error(error) => {
                        _ = promise.reject(error);
                        return;
                    }
                    Settled::Cancelled => {
                        _ = promise.cancel();
                        return;
                    }
                }
            }

            _ = promise.resolve(values);
        }));
    }

    gathered
}

/// Like [`when_all`], but bounded by a deadline: if the inputs have not all settled
/// within `timeout`, the output rejects with [`Error::Timeout`].
pub fn when_all_within<T, I>(futures: I, timeout: Duration) -> Future<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let inner = when_all(futures);
    let promise = Promise::new();
    let bounded = promise.future();

    // A dedicated driver waits so that neither the caller nor a pool worker is pinned
    // for the whole deadline.
    drop(thread::Builder::new().name("pact-when-all".to_string()).spawn(
        move || match inner.try_wait_for(timeout) {
            Ok(Some(values)) => _ = promise.resolve(values),
            Ok(None) => _ = promise.reject(Error::Timeout),
            Err(error) => _ = promise.reject(error),
        },
    ));

    bounded
}

/// Splits `items` into chunks and processes each chunk on the shared pool, returning one
/// future per chunk. Each future resolves with that chunk's results in input order.
///
/// A `chunk_size` of `None` (or zero) derives the chunk size from the available
/// parallelism.
pub fn parallel_process<T, U, F, I>(items: I, func: F, chunk_size: Option<usize>) -> Vec<Future<Vec<U>>>
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    let chunk_size = chunk_size
        .filter(|size| *size > 0)
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));

    let func = Arc::new(func);
    let mut futures = Vec::new();
    let mut pending = Vec::with_capacity(chunk_size);

    for item in items {
        pending.push(item);
        if pending.len() == chunk_size {
            futures.push(spawn_chunk(mem::take(&mut pending), Arc::clone(&func)));
            pending.reserve(chunk_size);
        }
    }
    if !pending.is_empty() {
        futures.push(spawn_chunk(pending, func));
    }

    futures
}

fn spawn_chunk<T, U, F>(chunk: Vec<T>, func: Arc<F>) -> Future<Vec<U>>
where
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    spawn(move || chunk.into_iter().map(|item| func(item)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn spawn_delivers_the_result() {
        let future = spawn(|| 6 * 7);
        assert_eq!(future.try_wait_for(TEST_TIMEOUT).unwrap(), Some(42));
    }

    #[test]
    fn spawn_surfaces_panics() {
        let future = spawn(|| -> i32 { panic!("worker exploded") });

        match future.try_wait_for(TEST_TIMEOUT) {
            Err(Error::UserPanic(message)) => assert_eq!(message, "worker exploded"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn pool_has_at_least_one_worker() {
        assert!(pool().max_count() >= 1);
    }

    #[test]
    fn when_all_preserves_input_order() {
        let promises: Vec<Promise<i32>> = (0..4).map(|_| Promise::new()).collect();
        let gathered = when_all(promises.iter().map(Promise::future));

        // Resolve out of order; the output vector still follows input order.
        for index in [2_usize, 0, 3, 1] {
            #[expect(clippy::cast_possible_truncation, reason = "small test indices")]
            promises[index].resolve(index as i32 * 10).unwrap();
        }

        assert_eq!(gathered.wait().unwrap(), vec![0, 10, 20, 30]);
    }

    #[test]
    fn when_all_of_nothing_is_empty() {
        let gathered = when_all(Vec::<Future<i32>>::new());
        assert_eq!(gathered.wait().unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn when_all_propagates_the_earliest_error() {
        let promises: Vec<Promise<i32>> = (0..3).map(|_| Promise::new()).collect();
        let gathered = when_all(promises.iter().map(Promise::future));

        promises[0].resolve(1).unwrap();
        promises[2].reject(Error::Timeout).unwrap();
        promises[1].reject(Error::BrokenPromise).unwrap();

        // Input index 1 settles abnormally before index 2 in input order.
        assert!(matches!(gathered.wait(), Err(Error::BrokenPromise)));
    }

    #[test]
    fn when_all_cancels_when_an_input_is_cancelled() {
        let promises: Vec<Promise<i32>> = (0..2).map(|_| Promise::new()).collect();
        let gathered = when_all(promises.iter().map(Promise::future));

        promises[0].resolve(1).unwrap();
        promises[1].cancel();

        assert!(matches!(gathered.wait(), Err(Error::Cancelled)));
        assert!(gathered.is_cancelled());
    }

    #[test]
    fn when_all_within_times_out() {
        let promise = Promise::<i32>::new();
        let gathered = when_all_within([promise.future()], Duration::from_millis(30));

        assert!(matches!(gathered.wait(), Err(Error::Timeout)));
    }

    #[test]
    fn when_all_within_completes_in_time() {
        let promise = Promise::new();
        let gathered = when_all_within([promise.future()], TEST_TIMEOUT);

        promise.resolve(5).unwrap();
        assert_eq!(gathered.wait().unwrap(), vec![5]);
    }

    #[test]
    fn parallel_process_chunks_and_preserves_order() {
        let futures = parallel_process(0..10, |x: i32| x * x, Some(4));

        assert_eq!(futures.len(), 3);
        let mut all = Vec::new();
        for future in futures {
            all.extend(future.try_wait_for(TEST_TIMEOUT).unwrap().unwrap());
        }
        assert_eq!(all, vec![0, 1, 4, 9, 16, 25, 36, 49, 64, 81]);
    }

    #[test]
    fn parallel_process_with_default_chunking_covers_everything() {
        let futures = parallel_process(0..100, |x: u64| x + 1, None);

        let mut total = 0;
        for future in futures {
            total += future
                .try_wait_for(TEST_TIMEOUT)
                .unwrap()
                .unwrap()
                .into_iter()
                .sum::<u64>();
        }
        assert_eq!(total, 5050);
    }
}
