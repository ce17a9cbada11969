// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded retry driving with fixed, doubling, and exponential backoff.
//!
//! [`async_retry`] re-invokes a closure until it succeeds or the attempt budget is
//! exhausted, sleeping between attempts per a [`BackoffStrategy`] bounded by a total
//! delay budget. The [`Retry`] builder adds success/exception/completion callbacks.
//! Outcomes travel through a [`pact::Future`]; a panicking closure surfaces as
//! [`pact::Error::UserPanic`] once the attempts run out.

// Public API surface.
mod backoff;
mod retry;

pub use backoff::BackoffStrategy;
pub use retry::{Retry, async_retry};
