// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for worker operations that return an [`Error`][enum@Error]
/// on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by a worker or a worker manager.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller of some API made a mistake (e.g. observed a worker that was never
    /// started).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `start_async` was called on a worker that already left the `Initial` state.
    #[error("worker was already started")]
    AlreadyStarted,

    /// A deadline elapsed before the worker reached a terminal state.
    #[error("deadline elapsed before the worker completed")]
    Timeout,

    /// The manager could not register a freshly started worker within its bounded
    /// insertion retries.
    #[error("could not register the worker after bounded retries")]
    Registration,

    /// We are re-packaging an error from the result slot without adding further detail.
    #[error(transparent)]
    Settle(#[from] pact::Error),

    /// We are re-packaging an error from the Rust standard library I/O logic (thread
    /// spawning) without adding further detail.
    #[error(transparent)]
    StdIo(#[from] std::io::Error),
}
