//! Artifact metadata carried in filenames.

use derive_more::Display;
use time::UtcDateTime;

/// Milliseconds since the Unix epoch.
///
/// Zero is reserved for "never happened": a book that has not been opened yet
/// has a `last_book_open` of [`Timestamp::UNSET`].
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const UNSET: Self = Self(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// `false` for [`Timestamp::UNSET`].
    pub const fn is_set(&self) -> bool {
        self.0 != 0
    }

    pub fn now() -> Self {
        UtcDateTime::now().into()
    }
}
impl From<UtcDateTime> for Timestamp {
    fn from(value: UtcDateTime) -> Self {
        // Dates before the epoch can't be represented on disk; clamp them to
        // UNSET rather than wrapping around.
        let millis = value.unix_timestamp_nanos() / 1_000_000;
        Self(u64::try_from(millis).unwrap_or(0))
    }
}

/// Metadata encoded in a `bookdata_` filename.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BookMetadata {
    /// Number of characters in the book's content.
    pub characters: u64,
    /// When the book's content was last replaced.
    pub last_book_modified: Timestamp,
    /// When the book was last opened for reading.
    pub last_book_open: Timestamp,
}

/// Metadata encoded in a `progress_` filename.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressMetadata {
    /// When the bookmark was last moved.
    pub last_bookmark_modified: Timestamp,
    /// Reading progress as a fraction in `[0, 1]`.
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_datetime() {
        let ts = Timestamp::from(UtcDateTime::from_unix_timestamp_nanos(1_704_067_200_250_000_000).unwrap());
        assert_eq!(ts.as_millis(), 1_704_067_200_250);
    }

    #[test]
    fn test_timestamp_before_epoch_is_unset() {
        let ts = Timestamp::from(UtcDateTime::from_unix_timestamp(-1).unwrap());
        assert_eq!(ts, Timestamp::UNSET);
        assert!(!ts.is_set());
    }

    #[test]
    fn test_timestamp_now_is_set() {
        assert!(Timestamp::now().is_set());
    }
}
