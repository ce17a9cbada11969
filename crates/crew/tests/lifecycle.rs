// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end worker lifecycle scenarios.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crew::{AsyncWorker, AsyncWorkerManager, Error, State};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn completion_deadline_cancels_the_worker() {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let worker = AsyncWorker::new();
    worker.set_timeout(Duration::from_millis(200));
    worker
        .start_async(move || {
            // Slower than the configured deadline.
            release_rx.recv_timeout(TEST_TIMEOUT).unwrap();
            1
        })
        .unwrap();

    let started = Instant::now();
    let outcome = worker.wait_for_completion();
    let elapsed = started.elapsed();

    assert!(matches!(outcome, Err(Error::Timeout)));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(500), "deadline overshoot: {elapsed:?}");

    // The cancel made the worker terminal without waiting out the closure.
    assert!(worker.is_done());
    assert_eq!(worker.state(), State::Cancelled);
    assert!(matches!(
        worker.get_result(Duration::ZERO),
        Err(Error::Settle(pact::Error::Cancelled))
    ));

    release_tx.send(()).unwrap();
}

#[test]
fn managed_fleet_completes_and_prunes() {
    let manager = AsyncWorkerManager::new();
    let workers: Vec<_> = (0..6)
        .map(|i| manager.create_worker(move || i * i).unwrap())
        .collect();

    manager.wait_for_all(TEST_TIMEOUT).unwrap();

    for (i, worker) in workers.iter().enumerate() {
        assert_eq!(worker.get_result(Duration::ZERO).unwrap(), i * i);
    }

    assert_eq!(manager.prune_completed_workers(), 6);
    assert_eq!(manager.size(), 0);
}

#[test]
fn validation_runs_the_predicate_once() {
    let worker = AsyncWorker::new();
    worker.start_async(|| "payload".to_string()).unwrap();
    worker.get_result(TEST_TIMEOUT).unwrap();

    assert!(worker.validate(|value| value == "payload"));
}

#[test]
fn managers_share_workers_across_threads() {
    let manager = std::sync::Arc::new(AsyncWorkerManager::new());

    let spawners: Vec<_> = (0..4)
        .map(|i| {
            let manager = std::sync::Arc::clone(&manager);
            thread::spawn(move || manager.create_worker(move || i).unwrap())
        })
        .collect();

    for spawner in spawners {
        spawner.join().unwrap();
    }

    assert_eq!(manager.size(), 4);
    manager.wait_for_all(TEST_TIMEOUT).unwrap();
    assert!(manager.all_done());
}
