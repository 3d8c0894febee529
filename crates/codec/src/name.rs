//! Artifact filename grammar.

use crate::cover::CoverFormat;
use crate::error::{ErrorKind, Result};
use crate::metadata::{BookMetadata, ProgressMetadata, Timestamp};
use regex::{Captures, Regex};
use std::str::FromStr;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Older writers appended a container extension; accept it, never emit it.
regex!(BOOK_NAME_REGEX, r"^bookdata_(\d+)-(\d+)-(\d+)(?:\.zip)?$");
regex!(PROGRESS_NAME_REGEX, r"^progress_(\d+)-(\d+(?:\.\d+)?)(?:\.json)?$");

/// The three kinds of artifact a title directory may hold, at most one of
/// each at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Book,
    Progress,
    Cover,
}

impl ArtifactKind {
    pub const ALL: [Self; 3] = [Self::Book, Self::Progress, Self::Cover];

    /// Reserved filename prefix, including the trailing underscore.
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Book => "bookdata_",
            Self::Progress => "progress_",
            Self::Cover => "cover_",
        }
    }

    /// Classify a filename by its prefix. Returns `None` for anything that
    /// isn't an artifact (stray files are ignored, not rejected).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.matches(name))
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(self.prefix())
    }
}

/// Encode book metadata as a `bookdata_` filename.
///
/// The title is not part of the filename: it names the directory the
/// artifact is stored in.
#[must_use]
pub fn book_file_name(metadata: &BookMetadata) -> String {
    format!(
        "{}{}-{}-{}",
        ArtifactKind::Book.prefix(),
        metadata.characters,
        metadata.last_book_modified,
        metadata.last_book_open
    )
}

/// Decode the metadata of a `bookdata_` filename.
pub fn parse_book_name(name: &str) -> Result<BookMetadata> {
    let captures = captures(&BOOK_NAME_REGEX, ArtifactKind::Book, name)?;
    Ok(BookMetadata {
        characters: field(&captures, 1, name)?,
        last_book_modified: Timestamp::from_millis(field(&captures, 2, name)?),
        last_book_open: Timestamp::from_millis(field(&captures, 3, name)?),
    })
}

/// Encode progress metadata as a `progress_` filename.
///
/// Progress is clamped into `[0, 1]` and written in its shortest decimal form
/// that parses back to the identical value.
#[must_use]
pub fn progress_file_name(metadata: &ProgressMetadata) -> String {
    let progress = match metadata.progress {
        // Also folds negative zero, which would print as "-0".
        p if p.is_nan() || p <= 0.0 => 0.0,
        p => p.min(1.0),
    };
    format!("{}{}-{}", ArtifactKind::Progress.prefix(), metadata.last_bookmark_modified, progress)
}

/// Decode the metadata of a `progress_` filename.
pub fn parse_progress_name(name: &str) -> Result<ProgressMetadata> {
    let captures = captures(&PROGRESS_NAME_REGEX, ArtifactKind::Progress, name)?;
    let progress: f64 = field(&captures, 2, name)?;
    if !(0.0..=1.0).contains(&progress) {
        exn::bail!(ErrorKind::Malformed(name.to_string()));
    }
    Ok(ProgressMetadata {
        last_bookmark_modified: Timestamp::from_millis(field(&captures, 1, name)?),
        progress,
    })
}

/// Name for a cover artifact, with the extension sniffed from the image data.
#[must_use]
pub fn cover_file_name(data: &[u8]) -> String {
    format!("{}{}", ArtifactKind::Cover.prefix(), CoverFormat::from_magic_bytes(data).extension())
}

fn captures<'n>(regex: &Regex, kind: ArtifactKind, name: &'n str) -> Result<Captures<'n>> {
    if !kind.matches(name) {
        exn::bail!(ErrorKind::UnknownPrefix(name.to_string()));
    }
    match regex.captures(name) {
        Some(captures) => Ok(captures),
        None => exn::bail!(ErrorKind::Malformed(name.to_string())),
    }
}

fn field<T: FromStr>(captures: &Captures<'_>, index: usize, name: &str) -> Result<T> {
    // Digits-only captures can still overflow the target integer type.
    match captures.get(index).map(|m| m.as_str().parse::<T>()) {
        Some(Ok(value)) => Ok(value),
        _ => exn::bail!(ErrorKind::Malformed(name.to_string())),
    }
}
