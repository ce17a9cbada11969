// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Non-binding thread priority guidance for a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    /// Below-normal priority.
    Low,

    /// The default priority.
    #[default]
    Normal,

    /// Above-normal priority.
    High,

    /// The highest priority a worker can ask for.
    Critical,
}

/// Opaque scheduler guidance a worker may apply to its underlying thread.
///
/// Hints are recorded and reported; whether they map to any OS-level behavior is an
/// implementation detail, and no such behavior is promised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerHint {
    /// Desired thread priority.
    pub priority: Priority,

    /// Preferred CPU to run on, if any.
    pub preferred_cpu: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_neutral() {
        let hint = SchedulerHint::default();

        assert_eq!(hint.priority, Priority::Normal);
        assert_eq!(hint.preferred_cpu, None);
    }
}
