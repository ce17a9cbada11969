// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

/// Expectation message for lock acquisitions. A poisoned lock means a thread panicked
/// while holding shaping state, at which point coalescing guarantees can no longer be
/// upheld.
pub(crate) const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because coalescing guarantees can no longer be upheld";

/// The smallest delay ever handed to the timer; a trailing target in the past is
/// clamped to this instead of being dropped.
pub(crate) const MIN_ARM: Duration = Duration::from_millis(1);

/// Runs the shaped user function, swallowing panics like every other callback fanout.
pub(crate) fn swallow(func: impl FnOnce()) {
    _ = catch_unwind(AssertUnwindSafe(func));
}
