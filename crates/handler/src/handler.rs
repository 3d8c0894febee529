//! The storage handler: every public operation on a filesystem-shaped
//! storage source.

use crate::card::BookCard;
use crate::error::{CodecResultExt, ErrorKind, Result, StorageResultExt};
use crate::index::{DirectoryIndex, subdirectories_of};
use crate::permission::{PermissionGate, UnlockPrompt};
use crate::policy::{Freshness, ReplicationPolicy, SaveBehavior};
use crate::progress::{Budget, ChangeListener, NoListener, NoProgress, ProgressSink};
use crate::records::{BookArchiver, BookRecord, BookmarkRecord, LocalLibrary};
use exn::{OptionExt, ResultExt};
use shelf_asyncutils::{CancellationToken, Limiter};
use shelf_codec::error::Result as CodecResult;
use shelf_codec::{
    ArtifactKind, BookMetadata, book_file_name, cover_file_name, parse_book_name, parse_progress_name,
    progress_file_name, sanitize,
};
use shelf_storage::{DirectoryRef, FileRef, SourceStore};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Per-source behaviour of a [`StorageHandler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Name of the configured storage source this handler targets.
    pub storage_source: String,
    pub save_behavior: SaveBehavior,
    /// Trust the index after a full listing instead of re-listing title
    /// directories on every access.
    pub cache_storage_data: bool,
    /// Prompt for unlock even when a root is already cached.
    pub ask_for_storage_unlock: bool,
}
impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            storage_source: String::new(),
            save_behavior: SaveBehavior::default(),
            cache_storage_data: true,
            ask_for_storage_unlock: false,
        }
    }
}

/// Raw artifact bytes together with the filename that carries their
/// metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub data: Vec<u8>,
}

pub enum BookPayload {
    /// Copied verbatim from another source.
    Artifact(Artifact),
    /// Packed by the [`BookArchiver`] before writing.
    Record(BookRecord),
}

pub enum ProgressPayload {
    Artifact(Artifact),
    /// Written as JSON.
    Record(BookmarkRecord),
}

/// Result of [`StorageHandler::delete_titles()`].
///
/// Deletion is best effort: a set `error` means at least one title could not
/// be deleted, however many ids are listed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Last failure, as a message naming the title.
    pub error: Option<String>,
    /// Card ids of the deleted titles that had a card.
    pub deleted_ids: Vec<u64>,
}

/// A title's files and, among them, the artifact that was asked for.
struct Located {
    root: DirectoryRef,
    sanitized: String,
    files: Vec<FileRef>,
    file: Option<FileRef>,
}

/// Reads and writes books, progress and covers of a storage source.
///
/// Each title is a directory under the source's root, named after the
/// sanitized title, holding at most one artifact per [`ArtifactKind`].
/// Every operation reports its progress budget (1.0 unless configured with
/// [`with_progress()`](Self::with_progress)) to the progress sink.
pub struct StorageHandler {
    settings: HandlerSettings,
    gate: PermissionGate,
    index: DirectoryIndex,
    limiter: Limiter,
    archiver: Option<Arc<dyn BookArchiver>>,
    library: Option<Arc<dyn LocalLibrary>>,
    progress: Arc<dyn ProgressSink>,
    budget: f64,
    listener: Arc<dyn ChangeListener>,
}

impl StorageHandler {
    pub fn new(settings: HandlerSettings, sources: Arc<dyn SourceStore>) -> Self {
        Self {
            settings,
            gate: PermissionGate::new(sources),
            index: DirectoryIndex::default(),
            limiter: Limiter::serial(),
            archiver: None,
            library: None,
            progress: Arc::new(NoProgress),
            budget: 1.0,
            listener: Arc::new(NoListener),
        }
    }

    pub fn with_unlock_prompt(mut self, prompt: Arc<dyn UnlockPrompt>) -> Self {
        self.gate = self.gate.with_prompt(prompt);
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn BookArchiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn with_library(mut self, library: Arc<dyn LocalLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Report progress to `sink`, allotting `budget` to every operation.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>, budget: f64) -> Self {
        self.progress = sink;
        self.budget = budget;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Run batches with `limiter` instead of one item at a time.
    pub fn with_limiter(mut self, limiter: Limiter) -> Self {
        self.limiter = limiter;
        self.index = DirectoryIndex::new(limiter);
        self
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Adopt new settings. Switching to another storage source drops
    /// everything cached for the previous one.
    pub async fn update_settings(&mut self, settings: HandlerSettings) {
        if settings.storage_source != self.settings.storage_source {
            info!(from = %self.settings.storage_source, to = %settings.storage_source, "storage source changed");
            self.clear_data(true).await;
        }
        self.settings = settings;
    }

    /// Forget cached file lists; with `clear_all`, also forget the root
    /// capability, title directories, cards and the full-listing flag.
    pub async fn clear_data(&self, clear_all: bool) {
        self.index.clear(clear_all).await;
        if clear_all {
            self.gate.clear().await;
        }
    }

    /// Cards of every title in the store. The root is listed once; later
    /// calls are served from the index while caching is enabled.
    #[instrument(skip(self))]
    pub async fn get_book_list(&self) -> Result<Vec<BookCard>> {
        let budget = self.budget();
        if !self.settings.cache_storage_data || !self.index.is_list_fetched().await {
            self.listener.list_loading(true);
            let listed = self.list_titles().await;
            self.listener.list_loading(false);
            listed?;
        }
        budget.finish();
        Ok(self.index.cards().await)
    }

    async fn list_titles(&self) -> Result<()> {
        let root = self.ensure_root().await?;
        let directories = subdirectories_of(&root).await?;
        if !self.settings.cache_storage_data {
            self.index.clear(true).await;
        }
        self.index.index_titles(directories, true).await?;
        self.index.mark_list_fetched().await;
        Ok(())
    }

    /// The raw book artifact of `title`.
    #[instrument(skip(self))]
    pub async fn get_book(&self, title: &str) -> Result<Option<Artifact>> {
        let mut budget = self.budget();
        let located = self.locate(title, ArtifactKind::Book, budget.split(0.8)).await?;
        read_artifact(located.file.as_ref()).await
    }

    /// The book of `title`, unpacked by the archiver.
    #[instrument(skip(self))]
    pub async fn get_book_record(&self, title: &str) -> Result<Option<BookRecord>> {
        let mut budget = self.budget();
        let archiver = self.archiver.as_ref().ok_or_raise(|| ErrorKind::Archive)?;
        let located = self.locate(title, ArtifactKind::Book, budget.split(0.4)).await?;
        let Some(artifact) = read_artifact(located.file.as_ref()).await? else {
            return Ok(None);
        };
        let record = archiver.unpack(&artifact.data).await.or_raise(|| ErrorKind::Archive)?;
        Ok(Some(record))
    }

    /// The raw progress artifact of `title`.
    #[instrument(skip(self))]
    pub async fn get_progress(&self, title: &str) -> Result<Option<Artifact>> {
        let mut budget = self.budget();
        let located = self.locate(title, ArtifactKind::Progress, budget.split(0.8)).await?;
        read_artifact(located.file.as_ref()).await
    }

    /// The bookmark of `title`, decoded from its progress artifact.
    #[instrument(skip(self))]
    pub async fn get_progress_record(&self, title: &str) -> Result<Option<BookmarkRecord>> {
        let mut budget = self.budget();
        let located = self.locate(title, ArtifactKind::Progress, budget.split(0.6)).await?;
        let Some(artifact) = read_artifact(located.file.as_ref()).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&artifact.data).or_raise(|| ErrorKind::Serialization)?))
    }

    /// The cover of `title`; a cover already held by its card is returned
    /// without touching storage.
    #[instrument(skip(self))]
    pub async fn get_cover(&self, title: &str) -> Result<Option<Vec<u8>>> {
        let mut budget = self.budget();
        if let Some(cover) = self.index.card(title).await.and_then(|card| card.cover) {
            debug!(title, "cover served from card");
            return Ok(Some(cover));
        }
        let located = self.locate(title, ArtifactKind::Cover, budget.split(0.8)).await?;
        Ok(read_artifact(located.file.as_ref()).await?.map(|artifact| artifact.data))
    }

    /// Store the book of `title`, unless the stored one is at least as
    /// fresh and the save behaviour says to keep it.
    #[instrument(skip(self, payload))]
    pub async fn save_book(&self, title: &str, payload: BookPayload) -> Result<()> {
        let mut budget = self.budget();
        let metadata = match &payload {
            BookPayload::Artifact(artifact) => parse_book_name(&artifact.name).or_codec()?,
            BookPayload::Record(record) => record.metadata(),
        };
        let located = self.locate(title, ArtifactKind::Book, budget.split(0.2)).await?;
        let existing = existing_metadata(located.file.as_ref(), parse_book_name);
        if self.policy().should_skip_write(&metadata, existing.as_ref()) {
            debug!(title, "stored book is up to date; skipping write");
            return Ok(());
        }
        let (data, share) = match payload {
            BookPayload::Artifact(artifact) => {
                budget.step(0.2);
                (artifact.data, 0.6)
            },
            BookPayload::Record(record) => {
                let archiver = self.archiver.as_ref().ok_or_raise(|| ErrorKind::Archive)?;
                let packed = archiver.pack(&record).await.or_raise(|| ErrorKind::Archive)?;
                budget.step(0.4);
                (packed, 0.4)
            },
        };
        let filename = book_file_name(&metadata);
        self.write_artifact(title, located, &filename, &data, budget.split(share)).await?;
        self.index.upsert_card(title, |card| card.book = metadata).await;
        Ok(())
    }

    /// Store the bookmark of `title`, under the same freshness rules as
    /// [`save_book()`](Self::save_book).
    #[instrument(skip(self, payload))]
    pub async fn save_progress(&self, title: &str, payload: ProgressPayload) -> Result<()> {
        let mut budget = self.budget();
        let metadata = match &payload {
            ProgressPayload::Artifact(artifact) => parse_progress_name(&artifact.name).or_codec()?,
            ProgressPayload::Record(record) => record.metadata(),
        };
        let located = self.locate(title, ArtifactKind::Progress, budget.split(0.4)).await?;
        let existing = existing_metadata(located.file.as_ref(), parse_progress_name);
        if self.policy().should_skip_write(&metadata, existing.as_ref()) {
            debug!(title, "stored progress is up to date; skipping write");
            return Ok(());
        }
        let data = match payload {
            ProgressPayload::Artifact(artifact) => artifact.data,
            ProgressPayload::Record(record) => serde_json::to_vec(&record).or_raise(|| ErrorKind::Serialization)?,
        };
        let filename = progress_file_name(&metadata);
        self.write_artifact(title, located, &filename, &data, budget.split(0.6)).await?;
        self.index.upsert_card(title, |card| card.progress = metadata).await;
        Ok(())
    }

    /// Store the cover of `title` if it has none; covers are never
    /// overwritten. The card of an indexed title picks up `data` either way.
    #[instrument(skip(self, data))]
    pub async fn save_cover(&self, title: &str, data: Option<Vec<u8>>) -> Result<()> {
        let mut budget = self.budget();
        let Some(data) = data else {
            return Ok(());
        };
        let located = self.locate(title, ArtifactKind::Cover, budget.split(0.4)).await?;
        if located.file.is_none() {
            let filename = cover_file_name(&data);
            self.write_artifact(title, located, &filename, &data, budget.split(0.6)).await?;
        } else {
            debug!(title, "cover already stored");
        }
        self.index.update_card(title, |card| card.cover = Some(data)).await;
        Ok(())
    }

    /// Re-store the book artifact of `title` under a name carrying
    /// `metadata`. Titles without a book artifact are left alone.
    #[instrument(skip(self))]
    pub async fn update_last_read(&self, title: &str, metadata: BookMetadata) -> Result<()> {
        let mut budget = self.budget();
        let located = self.locate(title, ArtifactKind::Book, budget.split(0.4)).await?;
        let Some(file) = located.file.clone() else {
            return Ok(());
        };
        let data = file.read().await.or_storage()?;
        let filename = book_file_name(&metadata);
        self.write_artifact(title, located, &filename, &data, budget.split(0.6)).await?;
        self.index.upsert_card(title, |card| card.book = metadata).await;
        Ok(())
    }

    /// Current artifact filename of `kind` for `title`, to compare against
    /// another source. Always `None` under [`SaveBehavior::Overwrite`],
    /// where freshness is never compared.
    #[instrument(skip(self))]
    pub async fn get_filename_for_recent_check(&self, title: &str, kind: ArtifactKind) -> Result<Option<String>> {
        let mut budget = self.budget();
        if self.settings.save_behavior == SaveBehavior::Overwrite {
            return Ok(None);
        }
        let located = self.locate(title, kind, budget.split(1.0)).await?;
        Ok(located.file.map(|file| file.name().to_string()))
    }

    /// Whether the stored book of `title` is at least as fresh as the one
    /// named `reference`.
    pub async fn is_book_present_and_up_to_date(&self, title: &str, reference: Option<&str>) -> Result<bool> {
        self.is_present_and_up_to_date(title, ArtifactKind::Book, reference, parse_book_name).await
    }

    /// Whether the stored progress of `title` is at least as fresh as the
    /// one named `reference`.
    pub async fn is_progress_present_and_up_to_date(&self, title: &str, reference: Option<&str>) -> Result<bool> {
        self.is_present_and_up_to_date(title, ArtifactKind::Progress, reference, parse_progress_name).await
    }

    #[instrument(skip(self, parse))]
    async fn is_present_and_up_to_date<M: Freshness>(
        &self,
        title: &str,
        kind: ArtifactKind,
        reference: Option<&str>,
        parse: fn(&str) -> CodecResult<M>,
    ) -> Result<bool> {
        let mut budget = self.budget();
        let Some(reference) = reference else {
            return Ok(false);
        };
        if self.settings.save_behavior == SaveBehavior::Overwrite {
            return Ok(false);
        }
        let reference = parse(reference).or_codec()?;
        let located = self.locate(title, kind, budget.split(1.0)).await?;
        let Some(existing) = existing_metadata(located.file.as_ref(), parse) else {
            return Ok(false);
        };
        Ok(self.policy().is_up_to_date(&reference, Some(&existing)))
    }

    /// Make sure the local library holds `title`, importing it when it was
    /// last synchronized from another source, and return its local id.
    ///
    /// A title that only exists in this source gets a placeholder record.
    #[instrument(skip(self))]
    pub async fn prepare_book_for_reading(&self, title: &str) -> Result<u64> {
        let mut budget = self.budget();
        let library = self.library.as_ref().ok_or_raise(|| ErrorKind::Library)?;
        let local = library.find_by_title(title).await.or_raise(|| ErrorKind::Library)?;
        let record = match &local {
            Some(record) if record.has_content() => Some(record.clone()),
            _ => {
                let located = self.locate(title, ArtifactKind::Book, budget.split(0.4)).await?;
                located
                    .file
                    .map(|_| local.clone().unwrap_or_else(|| BookRecord::placeholder(title)))
            },
        };
        let Some(mut record) = record else {
            exn::bail!(ErrorKind::NoDataFound(title.to_string()));
        };
        if record.storage_source.as_deref() != Some(self.settings.storage_source.as_str()) {
            record.storage_source = Some(self.settings.storage_source.clone());
            info!(title, "importing book into the local library");
            return library.import(record).await.or_raise(|| ErrorKind::Library);
        }
        Ok(local.and_then(|record| record.id).unwrap_or(0))
    }

    /// Delete the directories of `titles`, one at a time.
    ///
    /// `cancel` is checked before each title; titles not started when it is
    /// cancelled are skipped. A failing title does not stop the others; see
    /// [`DeleteOutcome`].
    #[instrument(skip(self, cancel), fields(titles = titles.len()))]
    pub async fn delete_titles(&self, titles: &[String], cancel: &CancellationToken) -> Result<DeleteOutcome> {
        let root = self.ensure_root().await?;
        let budgets = self.budget().divide(titles.len());
        let results = self
            .limiter
            .run_until_cancelled(titles.iter().zip(budgets), cancel, |(title, budget)| {
                self.delete_title(&root, title, budget)
            })
            .await;
        let mut outcome = DeleteOutcome::default();
        for result in results {
            match result {
                Ok(Some(id)) => outcome.deleted_ids.push(id),
                Ok(None) => {},
                Err(message) => outcome.error = Some(message),
            }
        }
        Ok(outcome)
    }

    async fn delete_title(&self, root: &DirectoryRef, title: &str, budget: Budget<'_>) -> std::result::Result<Option<u64>, String> {
        match remove_title_directory(root, title).await {
            Ok(()) => {
                let card = self.index.remove_title(title).await;
                info!(title, "deleted title");
                self.listener.data_list_changed();
                budget.finish();
                Ok(card.map(|card| card.id))
            },
            Err(err) => {
                warn!(title, error = %*err, "failed to delete title");
                Err(format!("Error deleting {title}: {}", *err))
            },
        }
    }

    fn budget(&self) -> Budget<'_> {
        Budget::new(self.progress.as_ref(), self.budget)
    }

    fn policy(&self) -> ReplicationPolicy {
        ReplicationPolicy::new(self.settings.save_behavior)
    }

    async fn ensure_root(&self) -> Result<DirectoryRef> {
        self.gate
            .ensure_root(&self.settings.storage_source, self.settings.ask_for_storage_unlock)
            .await
    }

    /// Find the files of `title` and the artifact of `kind` among them.
    async fn locate(&self, title: &str, kind: ArtifactKind, mut budget: Budget<'_>) -> Result<Located> {
        let root = self.ensure_root().await?;
        budget.step(0.5);
        let sanitized = sanitize(title).or_codec()?;
        let files = self
            .index
            .resolve_files_for_title(&root, title, &sanitized, self.settings.cache_storage_data)
            .await?;
        let file = files.iter().find(|file| kind.matches(file.name())).cloned();
        Ok(Located {
            root,
            sanitized,
            files,
            file,
        })
    }

    /// Write `data` as `filename` into the directory of `title`, then remove
    /// the artifact it supersedes (`located.file`) unless that is the file
    /// just written.
    ///
    /// The index records the new file before the removal is attempted. A
    /// failed removal leaves the superseded file listed behind it.
    async fn write_artifact(&self, title: &str, located: Located, filename: &str, data: &[u8], mut budget: Budget<'_>) -> Result<()> {
        let Located {
            root,
            sanitized,
            mut files,
            file: superseded,
        } = located;
        let directory = match self.index.directory(title).await {
            Some(directory) => directory,
            None => root.directory(&sanitized, true).await.or_storage()?,
        };
        let saved = directory.file(filename, true).await.or_storage()?;
        let mut sink = saved.writable().await.or_storage()?;
        sink.write(data).await.or_storage()?;
        sink.close().await.or_storage()?;
        budget.step(0.5);

        // Lookups take the first match, so the new file goes in front.
        files.retain(|file| file.name() != saved.name());
        files.insert(0, saved.clone());
        self.index.commit_write(title, directory.clone(), files.clone()).await;

        if let Some(superseded) = &superseded
            && !saved.is_same_entry(superseded.as_ref()).await.or_storage()?
        {
            directory.remove_entry(superseded.name(), false).await.or_storage()?;
            files.retain(|file| file.name() != superseded.name());
            self.index.commit_write(title, directory, files).await;
        }
        Ok(())
    }
}

async fn read_artifact(file: Option<&FileRef>) -> Result<Option<Artifact>> {
    let Some(file) = file else {
        return Ok(None);
    };
    Ok(Some(Artifact {
        name: file.name().to_string(),
        data: file.read().await.or_storage()?,
    }))
}

/// Metadata of an existing artifact; unparseable names count as absent.
fn existing_metadata<M>(file: Option<&FileRef>, parse: fn(&str) -> CodecResult<M>) -> Option<M> {
    let name = file?.name();
    match parse(name) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            warn!(name, error = %*err, "ignoring unparseable artifact name");
            None
        },
    }
}

async fn remove_title_directory(root: &DirectoryRef, title: &str) -> Result<()> {
    let name = sanitize(title).or_codec()?;
    root.remove_entry(&name, true).await.or_storage()
}
