// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for timer operations that return an [`Error`][enum@Error]
/// on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by the timer.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied an argument that fails eager validation (zero delay,
    /// repeat count below -1).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The timer was stopped; stopping is sticky and scheduling is refused afterwards.
    #[error("timer is stopped")]
    Stopped,
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
}
