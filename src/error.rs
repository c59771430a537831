//! Error types for coroutine operations.

use core::fmt;
use std::io;

/// Result type for coroutine operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by this crate.
///
/// Nothing is retried and nothing is recovered at this layer; every error is
/// surfaced to the caller immediately and the process continues.
#[derive(Debug)]
pub enum Error {
    /// Stack memory could not be reserved. Fatal to that `create` call only.
    Allocation(io::Error),

    /// Switch into an unknown, `Finished` or currently `Running` context.
    /// No transfer occurs and no state changes.
    InvalidTarget,

    /// Delete of a `Running` context, of the root context, or of a handle
    /// that was already deleted.
    InvalidState,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Allocation(e) => write!(f, "stack allocation failed: {}", e),
            Error::InvalidTarget => write!(f, "invalid switch target"),
            Error::InvalidState => write!(f, "invalid context state"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Allocation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Allocation(e)
    }
}
