//! Filename metadata codec for shelf libraries.
//!
//! A library on disk has no side-car index: every artifact carries its own
//! metadata in its filename. This crate owns that on-disk grammar:
//!
//! | Artifact | Filename                                                  |
//! |----------|-----------------------------------------------------------|
//! | Book     | `bookdata_<characters>-<lastBookModified>-<lastBookOpen>` |
//! | Progress | `progress_<lastBookmarkModified>-<progress>`              |
//! | Cover    | `cover_<extension>`                                       |
//!
//! Each artifact lives inside a directory named after the book's
//! [sanitized](sanitize) title. Comparisons between artifacts are always made
//! on the parsed values ([`BookMetadata`], [`ProgressMetadata`]), never on the
//! filename strings.

mod cover;
pub mod error;
mod metadata;
mod name;
mod sanitize;

pub use crate::cover::CoverFormat;
pub use crate::metadata::{BookMetadata, ProgressMetadata, Timestamp};
pub use crate::name::{ArtifactKind, book_file_name, cover_file_name, parse_book_name, parse_progress_name, progress_file_name};
pub use crate::sanitize::{desanitize, sanitize};
