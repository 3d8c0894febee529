use shelf_codec::{BookMetadata, ProgressMetadata};

/// In-memory summary of one title's artifacts, for listing UIs.
///
/// Cards are rebuilt from filenames whenever a title directory is indexed and
/// are never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookCard {
    /// Stable per title: a card rebuilt by a later listing keeps its id.
    pub id: u64,
    pub title: String,
    pub book: BookMetadata,
    pub progress: ProgressMetadata,
    /// Cover image bytes, if the title has a cover.
    pub cover: Option<Vec<u8>>,
}
impl BookCard {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: card_id(&title),
            title,
            ..Default::default()
        }
    }
}

/// Derive a card id from the first eight bytes of the title's BLAKE3 digest.
pub fn card_id(title: &str) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&blake3::hash(title.as_bytes()).as_bytes()[..8]);
    // Zero reads as "no id" to callers.
    u64::from_le_bytes(bytes).max(1)
}
