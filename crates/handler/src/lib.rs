//! Filesystem-backed storage handler for shelf libraries.
//!
//! Books, reading progress and covers of every title live in a directory
//! named after the title, each artifact's metadata encoded in its filename
//! (see [`shelf_codec`]). The [`StorageHandler`] keeps such a store in sync
//! with other storage sources: it decides from filename metadata alone
//! whether an artifact needs replacing ([`ReplicationPolicy`]), caches what
//! it has seen ([`DirectoryIndex`]), and re-acquires access to the store
//! when the host revokes it ([`PermissionGate`]).

mod card;
pub mod error;
mod handler;
mod index;
mod permission;
mod policy;
mod progress;
mod records;

pub use crate::card::{BookCard, card_id};
pub use crate::handler::{Artifact, BookPayload, DeleteOutcome, HandlerSettings, ProgressPayload, StorageHandler};
pub use crate::index::{DirectoryIndex, files_of, list, subdirectories_of};
pub use crate::permission::{PermissionGate, UnlockPrompt, UnlockRequest};
pub use crate::policy::{Freshness, ReplicationPolicy, SaveBehavior, is_not_newer};
pub use crate::progress::{Budget, ChangeListener, NoListener, NoProgress, ProgressSink, ProgressTally};
pub use crate::records::{BookArchiver, BookRecord, BookmarkRecord, LocalLibrary};
pub use shelf_asyncutils::CancellationToken;
