// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Call-rate shaping: debouncing and throttling over a shared timer.
//!
//! A [`Debouncer`] coalesces a burst of calls into one trailing invocation; a
//! [`Throttler`] lets at most one invocation through per interval. Neither ever blocks
//! the caller - trailing invocations are one-shot tasks on a shared
//! [`metronome::Timer`], invalidated by a generation stamp when a newer arm supersedes
//! them.
//!
//! Configuration errors reuse [`metronome::Error`], since the only thing that can be
//! invalid is the scheduling geometry (a zero delay or interval).

// Public API surface.
mod debouncer;
mod throttler;

pub use debouncer::Debouncer;
pub use throttler::Throttler;

// Internal to the crate but re-exported at crate root for reduced hassle.
mod shaping;

pub(crate) use shaping::{ERR_POISONED_LOCK, MIN_ARM, swallow};
