// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::time::{Duration, Instant};

/// How many more times a task fires, including the upcoming fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Repeat {
    /// The task fires until cancelled or the timer stops.
    Infinite,

    /// The task fires this many more times.
    Times(u32),
}

impl Repeat {
    /// Maps the API-level repeat count (-1 = infinite) onto this representation.
    /// The count must already be validated to be >= -1.
    pub fn from_count(count: i32) -> Self {
        if count == -1 {
            Self::Infinite
        } else {
            #[expect(clippy::cast_sign_loss, reason = "the caller validated count >= -1")]
            Self::Times(count as u32)
        }
    }
}

/// A scheduled job with its dispatch metadata.
pub(crate) struct ScheduledTask {
    pub job: Box<dyn FnMut() + Send>,
    pub delay: Duration,
    pub remaining: Repeat,
    pub priority: i32,
    pub next_fire_at: Instant,
    pub seq: u64,
}

impl ScheduledTask {
    /// The dispatch rank: lower compares first. Ties among equal priorities go to the
    /// earlier fire time, then to insertion order.
    pub fn rank(&self) -> (i32, Instant, u64) {
        (self.priority, self.next_fire_at, self.seq)
    }

    /// Accounts for one fire. Returns true when the task should be re-inserted, with
    /// `next_fire_at` already advanced relative to `now`.
    pub fn reschedule(&mut self, now: Instant) -> bool {
        match self.remaining {
            Repeat::Infinite => {}
            Repeat::Times(n) if n > 1 => self.remaining = Repeat::Times(n - 1),
            Repeat::Times(_) => return false,
        }

        self.next_fire_at = now + self.delay;
        true
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("delay", &self.delay)
            .field("remaining", &self.remaining)
            .field("priority", &self.priority)
            .field("next_fire_at", &self.next_fire_at)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}
