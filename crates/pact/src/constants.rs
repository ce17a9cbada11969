// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Expectation message for lock acquisitions. A poisoned lock means a thread panicked while
/// holding slot state, at which point the completion invariants can no longer be upheld.
pub(crate) const ERR_POISONED_LOCK: &str =
    "poisoned lock - cannot continue execution because completion guarantees can no longer be upheld";
