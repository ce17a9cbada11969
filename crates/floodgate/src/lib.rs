// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key sliding-window rate limiting with suspension of over-limit callers.
//!
//! A [`RateLimiter`] enforces, for every key, that at most `max_requests` calls proceed
//! within any sliding `window`. Over-limit callers (and all callers while the limiter is
//! paused) are recorded as rejected, parked in a per-key FIFO queue, and fail with
//! [`Error::RateLimitExceeded`] once they are drained - by [`RateLimiter::resume`], a
//! reset, or the limiter being dropped. A caller that was enqueued never succeeds; the
//! queue exists so rejected callers are released in a controlled, FIFO order instead of
//! spinning.
//!
//! State is sharded per key in concurrent maps, so unrelated keys do not contend.

// Public API surface.
mod error;
mod limiter;
mod settings;

pub use error::{Error, Result};
pub use limiter::RateLimiter;
pub use settings::Settings;

// Internal to the crate but re-exported at crate root for reduced hassle.
mod constants;

pub(crate) use constants::ERR_POISONED_LOCK;
