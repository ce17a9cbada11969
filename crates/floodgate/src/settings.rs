// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::error::{Error, Result};

/// The default budget installed for keys that were never configured explicitly.
pub(crate) const DEFAULT_MAX_REQUESTS: usize = 5;

/// The default window paired with [`DEFAULT_MAX_REQUESTS`].
pub(crate) const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// A per-key budget: at most `max_requests` calls within any sliding `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    max_requests: usize,
    window: Duration,
}

impl Settings {
    /// Creates a validated budget.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `max_requests` is zero or `window` is zero.
    /// Validation is eager - a limiter never stores an unusable budget.
    pub fn new(max_requests: usize, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(Error::invalid_argument("max_requests must be greater than zero"));
        }
        if window.is_zero() {
            return Err(Error::invalid_argument("window must be greater than zero"));
        }

        Ok(Self {
            max_requests,
            window,
        })
    }

    /// The maximum number of requests allowed inside the window.
    #[must_use]
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// The sliding window the budget applies to.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}
