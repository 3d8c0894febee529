//! Codec Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant carries the offending input so that callers can log it
/// without holding on to the original string.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The filename does not start with the prefix of the requested artifact.
    #[display("unexpected artifact prefix: {_0}")]
    UnknownPrefix(#[error(not(source))] String),
    /// The filename starts with the right prefix but its fields don't parse.
    #[display("malformed artifact name: {_0}")]
    Malformed(#[error(not(source))] String),
    /// Titles must contain at least one character.
    #[display("empty title")]
    EmptyTitle,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::UnknownPrefix("cover_png".to_string()).to_string(), "unexpected artifact prefix: cover_png");
        assert_eq!(ErrorKind::Malformed("bookdata_x".to_string()).to_string(), "malformed artifact name: bookdata_x");
        assert_eq!(ErrorKind::EmptyTitle.to_string(), "empty title");
    }
}
