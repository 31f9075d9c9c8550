//! Error types shared by all filters in this crate.

use thiserror::Error;

/// Errors raised by filter constructors and mutating operations.
///
/// `insert` failure (exhausting `max_kicks`) is deliberately *not* a variant
/// here: it is a soft failure reported as `false`, not a `Result::Err`. See
/// the crate-level docs for the rationale.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// A sizing parameter (`m`, `k`, `B`, `b`, `f`, `max_kicks`, ...) was
    /// less than 1. Raised synchronously before any state is allocated.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Human-readable description of which parameter failed and why.
        message: String,
    },

    /// `delete` was called for a key that is not present in either of its
    /// two candidate buckets.
    #[error("key not found")]
    NotFound,
}

/// Convenience alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
