//! Handler Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures from the storage and codec
//! crates are raised into one of these kinds, keeping the original frame as a
//! child.

use derive_more::{Display, Error};
use exn::ResultExt;

/// A handler error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for handler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Neither querying nor requesting access granted it.
    #[display("no permissions granted to access storage source {_0}")]
    PermissionDenied(#[error(not(source))] String),
    #[display("no storage source with name {_0} found")]
    SourceNotFound(#[error(not(source))] String),
    /// The source persisted something other than a directory capability.
    #[display("wrong filesystem handle type for storage source {_0}")]
    WrongHandleKind(#[error(not(source))] String),
    #[display("filesystem handle not found for storage source {_0}")]
    HandleMissing(#[error(not(source))] String),
    /// The host wants a user gesture before the root can be used again.
    #[display("user activation is required to access storage")]
    InteractiveUnlockRequired,
    /// Neither a local record nor an external artifact exists for the title.
    #[display("no local or external book data found for {_0}")]
    NoDataFound(#[error(not(source))] String),
    /// Host storage I/O failed.
    #[display("storage operation failed: {_0}")]
    Storage(#[error(not(source))] String),
    /// An artifact name could not be parsed, or a title could not be
    /// sanitized.
    #[display("invalid artifact name or title: {_0}")]
    Codec(#[error(not(source))] String),
    #[display("book archive could not be packed or unpacked")]
    Archive,
    #[display("local library lookup or import failed")]
    Library,
    #[display("bookmark data could not be (de)serialized")]
    Serialization,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::InteractiveUnlockRequired)
    }
}

/// Raise storage failures into handler errors.
pub(crate) trait StorageResultExt<T> {
    fn or_storage(self) -> Result<T>;
}
impl<T> StorageResultExt<T> for shelf_storage::error::Result<T> {
    fn or_storage(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = match err.is_activation_required() {
                    true => ErrorKind::InteractiveUnlockRequired,
                    false => ErrorKind::Storage((*err).to_string()),
                };
                Err(err).or_raise(|| kind)
            },
        }
    }
}

/// Raise codec failures into handler errors.
pub(crate) trait CodecResultExt<T> {
    fn or_codec(self) -> Result<T>;
}
impl<T> CodecResultExt<T> for shelf_codec::error::Result<T> {
    fn or_codec(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let message = (*err).to_string();
                Err(err).or_raise(|| ErrorKind::Codec(message))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_storage::error::ErrorKind as StorageErrorKind;
    use std::path::PathBuf;

    #[test]
    fn test_storage_errors_are_classified() {
        let activation: shelf_storage::error::Result<()> = Err(StorageErrorKind::ActivationRequired.into());
        let err = activation.or_storage().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InteractiveUnlockRequired));

        let message: shelf_storage::error::Result<()> =
            Err(StorageErrorKind::BackendError("NotAllowedError: activation is required".into()).into());
        assert!(matches!(&*message.or_storage().unwrap_err(), ErrorKind::InteractiveUnlockRequired));

        let missing: shelf_storage::error::Result<()> = Err(StorageErrorKind::NotFound(PathBuf::from("Title")).into());
        let err = missing.or_storage().unwrap_err();
        assert_eq!((*err).to_string(), "storage operation failed: entry not found: Title");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_codec_errors_keep_message() {
        let result: shelf_codec::error::Result<()> = Err(shelf_codec::error::ErrorKind::EmptyTitle.into());
        let err = result.or_codec().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Codec(message) if message == "empty title"));
    }
}
