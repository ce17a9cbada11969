// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One-shot packaged tasks: a callable bundled with the promise of its result.
//!
//! A [`PackagedTask`] composes a closure with a [`pact`] slot. The closure runs at most
//! once, no matter how many threads race to invoke it; the outcome (value, captured
//! panic, or cancellation) is observable through any number of [`pact::Future`] handles.
//!
//! Arguments are bound by closure capture - the idiomatic replacement for a variadic
//! call signature.

// Public API surface.
mod error;
mod packaged_task;

pub use error::{Error, Result};
pub use packaged_task::PackagedTask;
