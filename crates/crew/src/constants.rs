// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Expectation message for lock acquisitions. A poisoned lock means a thread panicked
/// while holding worker bookkeeping, at which point lifecycle guarantees can no longer
/// be upheld.
pub(crate) const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because lifecycle guarantees can no longer be upheld";

/// How often completion polls re-check worker state.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);
