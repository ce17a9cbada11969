// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! This example demonstrates one-shot and periodic scheduling on one timer.

use std::time::Duration;

use metronome::Timer;

fn main() {
    let timer = Timer::new();

    // A periodic heartbeat at normal priority.
    timer
        .set_interval(|| println!("tick"), Duration::from_millis(100), 5, 10)
        .expect("interval parameters are valid");

    // A one-shot task at a better priority; its result arrives through a future.
    let future = timer
        .set_timeout(|| "one-shot fired", Duration::from_millis(250))
        .expect("timeout parameters are valid");
    println!("{}", future.wait().expect("the timer runs the task"));

    // Let the remaining heartbeats drain, then shut down.
    timer.wait();
    timer.stop();
}
