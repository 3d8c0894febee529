//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use regex::Regex;
use std::io::Error as IoError;
use std::path::PathBuf;
use std::sync::LazyLock;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

// Hosts that can't give us a typed error still say it in words.
static ACTIVATION_REQUIRED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)activation is required").unwrap());

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Entry does not exist
    #[display("entry not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied by the host
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Entry exists but is a file where a directory was expected (or the
    /// other way around)
    #[display("entry has the wrong type: {}", _0.display())]
    TypeMismatch(#[error(not(source))] PathBuf),
    /// Entry name is empty, contains separators, or escapes its directory
    #[display("invalid entry name: {_0}")]
    InvalidName(#[error(not(source))] String),
    /// The host wants a fresh user gesture before the capability can be used
    #[display("user activation is required")]
    ActivationRequired,
    /// A writable sink was used after it had been closed
    #[display("writable already closed: {}", _0.display())]
    Closed(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// Returns `true` if the host refused because it needs the user to act
    /// first, either through the typed variant or a backend message saying so.
    pub fn is_activation_required(&self) -> bool {
        match self {
            Self::ActivationRequired => true,
            Self::BackendError(message) => ACTIVATION_REQUIRED.is_match(message),
            _ => false,
        }
    }
}
