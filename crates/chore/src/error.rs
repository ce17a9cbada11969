// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for packaged-task operations that return an
/// [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by a packaged task.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The task no longer holds its callable - it was already invoked.
    #[error("packaged task was already invoked")]
    InvalidTask,
}
