// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end sliding-window behavior under a configured budget.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use floodgate::{Error, RateLimiter};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn burst_over_budget_rejects_exactly_the_overflow() {
    let limiter = Arc::new(RateLimiter::new());
    limiter
        .set_function_limit("k", 3, Duration::from_secs(1))
        .unwrap();

    // Three calls in one burst fit the budget.
    for _ in 0..3 {
        limiter.acquire("k").unwrap();
    }

    // The fourth is rejected and parks until drained.
    let fourth = thread::spawn({
        let limiter = Arc::clone(&limiter);
        move || limiter.acquire("k")
    });

    let started = Instant::now();
    while limiter.rejected_requests("k") != 1 {
        assert!(started.elapsed() < TEST_TIMEOUT);
        thread::sleep(Duration::from_millis(5));
    }

    // After the window slides past the burst, draining releases the parked caller
    // (which still fails, by contract) and a fresh call succeeds.
    thread::sleep(Duration::from_millis(1100));
    limiter.resume();

    assert!(matches!(
        fourth.join().unwrap(),
        Err(Error::RateLimitExceeded { key }) if key == "k"
    ));
    assert_eq!(limiter.rejected_requests("k"), 1);

    limiter.acquire("k").unwrap();
    assert_eq!(limiter.rejected_requests("k"), 1);
}

#[test]
fn keys_are_isolated_from_each_other() {
    let limiter = RateLimiter::new();
    limiter
        .set_function_limit("tight", 1, Duration::from_secs(60))
        .unwrap();
    limiter
        .set_function_limit("roomy", 1000, Duration::from_secs(60))
        .unwrap();

    limiter.acquire("tight").unwrap();
    for _ in 0..50 {
        limiter.acquire("roomy").unwrap();
    }

    assert_eq!(limiter.rejected_requests("tight"), 0);
    assert_eq!(limiter.rejected_requests("roomy"), 0);
}

#[test]
fn concurrent_bursts_never_exceed_the_window_budget() {
    let limiter = Arc::new(RateLimiter::new());
    limiter
        .set_function_limit("k", 8, Duration::from_secs(60))
        .unwrap();

    let callers: Vec<_> = (0..16)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            thread::spawn(move || limiter.acquire("k").is_ok())
        })
        .collect();

    // Unblock the losers so their threads can finish.
    let started = Instant::now();
    while limiter.rejected_requests("k") != 8 {
        assert!(started.elapsed() < TEST_TIMEOUT);
        thread::sleep(Duration::from_millis(5));
    }
    limiter.reset_all();

    let admitted = callers
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|&admitted| admitted)
        .count();

    assert_eq!(admitted, 8);
}
