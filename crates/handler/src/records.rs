//! Records exchanged with the local library, and the collaborators that
//! store and (de)serialize them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shelf_codec::{BookMetadata, ProgressMetadata, Timestamp};

/// A book as the local library stores it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub title: String,
    /// Rendered book content; empty for placeholders.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub characters: u64,
    #[serde(default)]
    pub last_book_modified: u64,
    #[serde(default)]
    pub last_book_open: u64,
    /// Name of the storage source the record was last synchronized from.
    #[serde(default)]
    pub storage_source: Option<String>,
}
impl BookRecord {
    /// An empty record standing in for a book that only exists externally.
    pub fn placeholder(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            characters: self.characters,
            last_book_modified: Timestamp::from_millis(self.last_book_modified),
            last_book_open: Timestamp::from_millis(self.last_book_open),
        }
    }
}

/// A reading-progress bookmark, stored as JSON in `progress_` artifacts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_id: Option<u64>,
    #[serde(default)]
    pub explored_char_count: u64,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub last_bookmark_modified: u64,
}
impl BookmarkRecord {
    pub fn metadata(&self) -> ProgressMetadata {
        ProgressMetadata {
            last_bookmark_modified: Timestamp::from_millis(self.last_bookmark_modified),
            progress: self.progress,
        }
    }
}

/// Packs book records into transportable archives and back.
///
/// Implementations should fail with [`Archive`](crate::error::ErrorKind::Archive).
#[async_trait]
pub trait BookArchiver: Send + Sync {
    async fn pack(&self, record: &BookRecord) -> Result<Vec<u8>>;
    async fn unpack(&self, data: &[u8]) -> Result<BookRecord>;
}

/// The local book database.
///
/// Implementations should fail with [`Library`](crate::error::ErrorKind::Library).
#[async_trait]
pub trait LocalLibrary: Send + Sync {
    async fn find_by_title(&self, title: &str) -> Result<Option<BookRecord>>;

    /// Store `record`, replacing any record with the same title, and return
    /// its id.
    async fn import(&self, record: BookRecord) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_json_shape() {
        let bookmark = BookmarkRecord {
            data_id: Some(3),
            explored_char_count: 1200,
            progress: 0.25,
            last_bookmark_modified: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&bookmark).unwrap();
        assert_eq!(json["exploredCharCount"], 1200);
        assert_eq!(json["lastBookmarkModified"], 1_700_000_000_000u64);
        let parsed: BookmarkRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, bookmark);
    }

    #[test]
    fn test_bookmark_tolerates_missing_fields() {
        let parsed: BookmarkRecord = serde_json::from_str(r#"{"progress":0.5}"#).unwrap();
        assert_eq!(parsed.metadata().progress, 0.5);
        assert!(!parsed.metadata().last_bookmark_modified.is_set());
    }

    #[test]
    fn test_placeholder() {
        let record = BookRecord::placeholder("Kokoro");
        assert!(!record.has_content());
        assert_eq!(record.metadata(), BookMetadata::default());
    }
}
