// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for rate-limiter operations that return an
/// [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by the rate limiter.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied a limit that fails eager validation (zero budget or zero
    /// window).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller exceeded the key's budget (or arrived while paused) and was drained
    /// from the waiter queue.
    #[error("rate limit exceeded for key {key:?}")]
    RateLimitExceeded {
        /// The key the rejected call was made under.
        key: String,
    },
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Send, Sync, Clone);
    }

    #[test]
    fn rejection_names_the_key() {
        let error = Error::RateLimitExceeded {
            key: "search".to_string(),
        };
        assert_eq!(error.to_string(), "rate limit exceeded for key \"search\"");
    }
}
