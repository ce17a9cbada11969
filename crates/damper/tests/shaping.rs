// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Debouncer and throttler sharing one timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use damper::{Debouncer, Throttler};
use metronome::Timer;

#[test]
fn shapers_share_a_dispatcher_without_interference() {
    let timer = Arc::new(Timer::new());

    let saves = Arc::new(AtomicUsize::new(0));
    let paints = Arc::new(AtomicUsize::new(0));

    let debouncer = Debouncer::new(
        &timer,
        {
            let saves = Arc::clone(&saves);
            move || {
                saves.fetch_add(1, Ordering::SeqCst);
            }
        },
        Duration::from_millis(30),
    )
    .unwrap();

    let throttler = Throttler::new(
        &timer,
        {
            let paints = Arc::clone(&paints);
            move || {
                paints.fetch_add(1, Ordering::SeqCst);
            }
        },
        Duration::from_millis(30),
    )
    .unwrap()
    .leading(true);

    // A busy editing session: every keystroke debounces a save and throttles a repaint.
    for _ in 0..10 {
        debouncer.call();
        throttler.call();
        thread::sleep(Duration::from_millis(5));
    }

    thread::sleep(Duration::from_millis(120));

    // One trailing save for the whole burst.
    assert_eq!(saves.load(Ordering::SeqCst), 1);

    // Repaints: a leading one, plus roughly one per elapsed interval.
    let observed = paints.load(Ordering::SeqCst);
    assert!((1..=4).contains(&observed), "paints: {observed}");
}
