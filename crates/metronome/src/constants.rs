// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Expectation message for lock acquisitions. A poisoned lock means a thread panicked
/// while holding the task queue, at which point scheduling guarantees can no longer be
/// upheld.
pub(crate) const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because scheduling guarantees can no longer be upheld";
