// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dedicated worker threads with lifecycle tracking, timeouts, cancellation, and a
//! managing container.
//!
//! An [`AsyncWorker`] launches a user closure on its own thread and tracks it through a
//! sticky terminal lifecycle. The result travels through a [`pact`] slot, so consumers
//! get the full set of blocking, timed, and callback-based observation tools. An
//! [`AsyncWorkerManager`] owns many workers and offers bulk operations over them.
//!
//! Scheduler hints (thread priority, preferred CPU) are opaque guidance: they are
//! recorded and reported, and an implementation may honor or ignore them. No OS-level
//! behavior is promised.

// Public API surface.
mod error;
mod hints;
mod manager;
mod worker;

pub use error::{Error, Result};
pub use hints::{Priority, SchedulerHint};
pub use manager::AsyncWorkerManager;
pub use worker::{AsyncWorker, State};

// Internal to the crate but re-exported at crate root for reduced hassle.
mod constants;

pub(crate) use constants::{ERR_POISONED_LOCK, POLL_INTERVAL};
