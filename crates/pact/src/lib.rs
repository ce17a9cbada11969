// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Blocking promise/future pairs with cancellation, callbacks, and continuation chaining.
//!
//! This crate provides the single-writer, multiple-reader result slot that the rest of the
//! workspace builds on. A [`Promise`] is the unique write side of a slot; any number of
//! [`Future`] handles observe the same slot and can block on it, poll it, chain
//! continuations onto it, or register completion callbacks against it.
//!
//! # Core Types
//!
//! - [`Promise`]: resolves or rejects a slot exactly once; dropping it unfulfilled breaks it.
//! - [`Future`]: waits for the slot, with timed variants, cancellation, and chaining
//!   ([`Future::then`], [`Future::catching`], [`Future::retry`]).
//! - [`when_all`] / [`when_all_within`]: gather many futures into one.
//! - [`spawn`] / [`parallel_process`]: run closures on the shared pool and observe the
//!   outcome through a future.
//!
//! # Example
//!
//! ```
//! use pact::Promise;
//!
//! let promise = Promise::new();
//! let future = promise.future().then(|x: i32| x * 2);
//!
//! promise.resolve(21).unwrap();
//! assert_eq!(future.wait().unwrap(), 42);
//! ```
//!
//! # Thread safety
//!
//! All handles are `Send` and `Sync` for `Send` result types. Completion callbacks and
//! continuations run outside the slot's internal lock, on whichever thread performs the
//! terminal transition (or on the registering thread when the slot is already terminal).

// Public API surface.
mod combinators;
mod error;
mod future;
mod promise;

pub use combinators::{parallel_process, pool, spawn, when_all, when_all_within};
pub use error::{Error, Result};
pub use future::Future;
pub use promise::Promise;

// Internal to the crate but re-exported at crate root for reduced hassle.
mod constants;
mod slot;

pub(crate) use constants::ERR_POISONED_LOCK;
