// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;

use thiserror::Error;

/// A specialized `Result` type for slot operations that return an [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by a promise, a future, or one of the gathering helpers.
///
/// The type is `Clone` because a single terminal error may be fanned out to any number of
/// future handles and downstream continuations.
///
/// Specific enum variants may provide additional detail. Future versions may add additional
/// enum variants.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller of some API supplied an argument that fails eager validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The future handle is detached from any result slot.
    #[error("future is not connected to a result slot")]
    InvalidFuture,

    /// A second terminal transition was attempted on an already settled slot.
    #[error("result slot is already settled")]
    AlreadySettled,

    /// The slot was cancelled before (or instead of) completing with a value.
    #[error("operation was cancelled")]
    Cancelled,

    /// The write side was dropped without ever settling the slot.
    #[error("promise was dropped before completion")]
    BrokenPromise,

    /// A deadline elapsed before the observed slot settled.
    #[error("deadline elapsed before completion")]
    Timeout,

    /// User code panicked; the payload is preserved as a rendered message.
    #[error("user code panicked: {0}")]
    UserPanic(String),
}

impl Error {
    /// Creates an [`Error::InvalidArgument`] from any displayable message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Converts a payload captured by `catch_unwind` into a [`Error::UserPanic`].
    ///
    /// String-ish payloads (the overwhelmingly common case produced by `panic!` and
    /// `assert!`) are preserved verbatim; anything else is replaced with a placeholder.
    #[must_use]
    pub fn user_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload.downcast_ref::<&str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .map_or_else(|| "opaque panic payload".to_string(), Clone::clone)
            },
            |s| (*s).to_string(),
        );

        Self::UserPanic(message)
    }
}
