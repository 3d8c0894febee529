//! In-memory index of title directories.
//!
//! Maps each title to its directory capability, the artifact files inside it,
//! and the [`BookCard`] built from those files. The index is built lazily and
//! is the only state that can go stale; it is reset wholesale (never patched)
//! when the storage source changes or indexing fails.

use crate::card::BookCard;
use crate::error::{Result, StorageResultExt};
use futures::TryStreamExt;
use shelf_asyncutils::Limiter;
use shelf_codec::{ArtifactKind, desanitize, parse_book_name, parse_progress_name};
use shelf_storage::error::ErrorKind as StorageErrorKind;
use shelf_storage::{DirectoryRef, Entry, FileRef};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

#[derive(Default)]
struct IndexState {
    directories: HashMap<String, DirectoryRef>,
    files: HashMap<String, Vec<FileRef>>,
    cards: HashMap<String, BookCard>,
    list_fetched: bool,
}

/// What a single artifact contributes to its title's card.
enum Contribution {
    Book(shelf_codec::BookMetadata),
    Progress(shelf_codec::ProgressMetadata),
    Cover(Vec<u8>),
    Nothing,
}

pub struct DirectoryIndex {
    state: RwLock<IndexState>,
    limiter: Limiter,
}
impl Default for DirectoryIndex {
    fn default() -> Self {
        Self::new(Limiter::serial())
    }
}
impl DirectoryIndex {
    pub fn new(limiter: Limiter) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            limiter,
        }
    }

    /// Index every directory, one at a time.
    ///
    /// The first failure abandons the directories not yet indexed and is
    /// returned; with `clear_on_error` the whole index is cleared first so
    /// that no partially built view is exposed. Directories without files
    /// are skipped.
    #[instrument(skip_all, fields(directories = directories.len()))]
    pub async fn index_titles(&self, directories: Vec<DirectoryRef>, clear_on_error: bool) -> Result<()> {
        let indexed = self.limiter.try_run(directories, |directory| self.index_one(directory)).await;
        if let Err(err) = indexed {
            if clear_on_error {
                warn!("indexing failed; clearing index");
                self.clear(true).await;
            }
            return Err(err);
        }
        Ok(())
    }

    async fn index_one(&self, directory: DirectoryRef) -> Result<()> {
        let Some((card, files)) = self.scan(&directory).await? else {
            debug!(directory = directory.name(), "skipping empty directory");
            return Ok(());
        };
        let mut state = self.state.write().await;
        state.directories.insert(card.title.clone(), directory);
        state.files.insert(card.title.clone(), files);
        state.cards.insert(card.title.clone(), card);
        Ok(())
    }

    /// Build the card of one title directory from its files.
    async fn scan(&self, directory: &DirectoryRef) -> Result<Option<(BookCard, Vec<FileRef>)>> {
        let files = files_of(directory).await?;
        if files.is_empty() {
            return Ok(None);
        }
        let mut card = BookCard::new(desanitize(directory.name()));
        let contributions = self.limiter.try_run(files.iter(), classify).await?;
        for contribution in contributions {
            match contribution {
                Contribution::Book(metadata) => card.book = metadata,
                Contribution::Progress(metadata) => card.progress = metadata,
                Contribution::Cover(data) => card.cover = Some(data),
                Contribution::Nothing => {},
            }
        }
        Ok(Some((card, files)))
    }

    /// Files known for `title`, listing its directory first if needed.
    ///
    /// With caching enabled, cached files are used when the title was
    /// already indexed or a full listing was performed. Otherwise the title's
    /// directory is looked up under `root` and indexed on its own; a title
    /// without a directory simply has no files.
    pub async fn resolve_files_for_title(&self, root: &DirectoryRef, title: &str, sanitized: &str, cache_enabled: bool) -> Result<Vec<FileRef>> {
        let lookup = {
            let state = self.state.read().await;
            !(cache_enabled && (state.list_fetched || state.files.contains_key(title)))
        };
        if lookup {
            // A directory emptied or removed behind our back must not keep
            // its old file list.
            self.state.write().await.files.remove(title);
            match root.directory(sanitized, false).await {
                Ok(directory) => self.index_titles(vec![directory], false).await?,
                Err(err) if matches!(&*err, StorageErrorKind::NotFound(_) | StorageErrorKind::TypeMismatch(_)) => {
                    debug!(title, "no directory for title");
                },
                Err(err) => return Err(err).or_storage(),
            }
        }
        Ok(self.state.read().await.files.get(title).cloned().unwrap_or_default())
    }

    /// Always forgets file lists; `clear_all` also forgets directories, cards
    /// and whether a full listing was performed.
    pub async fn clear(&self, clear_all: bool) {
        let mut state = self.state.write().await;
        state.files.clear();
        if clear_all {
            state.directories.clear();
            state.cards.clear();
            state.list_fetched = false;
        }
    }

    pub async fn is_list_fetched(&self) -> bool {
        self.state.read().await.list_fetched
    }

    pub async fn mark_list_fetched(&self) {
        self.state.write().await.list_fetched = true;
    }

    /// All cards, ordered by title.
    pub async fn cards(&self) -> Vec<BookCard> {
        let mut cards: Vec<_> = self.state.read().await.cards.values().cloned().collect();
        cards.sort_by(|a, b| a.title.cmp(&b.title));
        cards
    }

    pub async fn card(&self, title: &str) -> Option<BookCard> {
        self.state.read().await.cards.get(title).cloned()
    }

    pub async fn directory(&self, title: &str) -> Option<DirectoryRef> {
        self.state.read().await.directories.get(title).cloned()
    }

    /// Record a finished write: the title's canonical directory and its new
    /// file list.
    pub async fn commit_write(&self, title: &str, directory: DirectoryRef, files: Vec<FileRef>) {
        let mut state = self.state.write().await;
        state.directories.insert(title.to_string(), directory);
        state.files.insert(title.to_string(), files);
    }

    /// Update the card of `title`, creating it when missing.
    pub async fn upsert_card(&self, title: &str, update: impl FnOnce(&mut BookCard)) {
        let mut state = self.state.write().await;
        update(state.cards.entry(title.to_string()).or_insert_with(|| BookCard::new(title)));
    }

    /// Update the card of `title` only if it is indexed.
    pub async fn update_card(&self, title: &str, update: impl FnOnce(&mut BookCard)) -> bool {
        match self.state.write().await.cards.get_mut(title) {
            Some(card) => {
                update(card);
                true
            },
            None => false,
        }
    }

    /// Purge `title` from the index, returning its card if it had one.
    pub async fn remove_title(&self, title: &str) -> Option<BookCard> {
        let mut state = self.state.write().await;
        state.directories.remove(title);
        state.files.remove(title);
        state.cards.remove(title)
    }
}

/// List a directory's direct children: its subdirectories when
/// `include_subdirectories` is set, its files otherwise. Never both.
pub async fn list(directory: &DirectoryRef, include_subdirectories: bool) -> Result<Vec<Entry>> {
    directory
        .entries()
        .try_filter(|entry| {
            let keep = matches!(entry, Entry::Directory(_)) == include_subdirectories;
            async move { keep }
        })
        .try_collect::<Vec<_>>()
        .await
        .or_storage()
}

pub async fn subdirectories_of(directory: &DirectoryRef) -> Result<Vec<DirectoryRef>> {
    Ok(list(directory, true)
        .await?
        .into_iter()
        .filter_map(|entry| match entry {
            Entry::Directory(directory) => Some(directory),
            Entry::File(_) => None,
        })
        .collect())
}

pub async fn files_of(directory: &DirectoryRef) -> Result<Vec<FileRef>> {
    Ok(list(directory, false)
        .await?
        .into_iter()
        .filter_map(|entry| match entry {
            Entry::File(file) => Some(file),
            Entry::Directory(_) => None,
        })
        .collect())
}

async fn classify(file: &FileRef) -> Result<Contribution> {
    let name = file.name();
    Ok(match ArtifactKind::from_name(name) {
        Some(ArtifactKind::Book) => match parse_book_name(name) {
            Ok(metadata) => Contribution::Book(metadata),
            Err(err) => {
                warn!(name, error = %*err, "skipping unparseable book artifact");
                Contribution::Nothing
            },
        },
        Some(ArtifactKind::Progress) => match parse_progress_name(name) {
            Ok(metadata) => Contribution::Progress(metadata),
            Err(err) => {
                warn!(name, error = %*err, "skipping unparseable progress artifact");
                Contribution::Nothing
            },
        },
        Some(ArtifactKind::Cover) => Contribution::Cover(file.read().await.or_storage()?),
        None => Contribution::Nothing,
    })
}
