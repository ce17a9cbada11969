// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! This example demonstrates the basic promise/future workflow.

use std::thread;
use std::time::Duration;

use pact::{Promise, spawn, when_all};

fn main() {
    // Hand the read side to a consumer and fulfill the promise elsewhere.
    let promise = Promise::new();
    let future = promise.future().then(|x: u32| x * 2);

    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        promise.resolve(21).expect("nobody else settles this slot");
    });

    println!("chained result: {}", future.wait().expect("producer resolves"));

    // Fan work out on the shared pool and gather the results in order.
    let futures: Vec<_> = (1..=4).map(|n| spawn(move || n * n)).collect();
    let squares = when_all(futures).wait().expect("all workers succeed");
    println!("squares: {squares:?}");
}
