//! Directory capability traits and implementations.
//!
//! A storage root is handed to us as a [`DirectoryHandle`]: an opaque
//! capability that can enumerate, create and remove its direct children, and
//! that the host may revoke at any time (see [`PermissionState`]). Files are
//! [`FileHandle`]s, written through a [`WritableSink`] that only commits
//! when explicitly closed.
//!

mod local;
#[cfg(any(test, feature = "mock"))]
mod memory;

pub use self::local::{LocalDirectory, LocalFile};
#[cfg(any(test, feature = "mock"))]
pub use self::memory::{MemoryDirectory, MemoryFile};
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

/// Shared handle to a directory capability.
pub type DirectoryRef = Arc<dyn DirectoryHandle>;
/// Shared handle to a file capability.
pub type FileRef = Arc<dyn FileHandle>;
pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;

/// Answer from the host when asked about access to a capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; a request will ask the user.
    Prompt,
}

/// Access level asked for in permission queries and requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    #[default]
    ReadWrite,
}

/// A typed child of a directory.
#[derive(Clone)]
pub enum Entry {
    File(FileRef),
    Directory(DirectoryRef),
}
impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => file.name(),
            Self::Directory(directory) => directory.name(),
        }
    }
}
impl Debug for dyn DirectoryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("DirectoryHandle").field(&self.location()).finish()
    }
}
impl Debug for dyn FileHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("FileHandle").field(&self.location()).finish()
    }
}
impl Debug for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::File(file) => f.debug_tuple("File").field(&file.location()).finish(),
            Self::Directory(directory) => f.debug_tuple("Directory").field(&directory.location()).finish(),
        }
    }
}

/// A directory-shaped capability.
///
/// All operations are asynchronous; each call is a suspension point where the
/// host may interleave other work. Children are always addressed by a single
/// [validated](crate::validate_name) name, never by path.
///
/// # Examples
///
/// ```
/// use shelf_storage::backend::DirectoryHandle;
/// use shelf_storage::error::Result;
///
/// async fn store(root: &dyn DirectoryHandle, title: &str, bytes: &[u8]) -> Result<()> {
///     let directory = root.directory(title, true).await?;
///     let file = directory.file("cover_png", true).await?;
///     let mut sink = file.writable().await?;
///     sink.write(bytes).await?;
///     sink.close().await
/// }
/// ```
#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    /// Name of this directory within its parent (empty for some roots).
    fn name(&self) -> &str;

    /// Location relative to the storage root.
    fn location(&self) -> &Path;

    /// Ask whether access is currently granted, without prompting.
    async fn query_permission(&self, mode: AccessMode) -> Result<PermissionState>;

    /// Ask for access, prompting the user if the host needs to.
    async fn request_permission(&self, mode: AccessMode) -> Result<PermissionState>;

    /// Stream the direct children of this directory, in no particular order.
    fn entries(&self) -> EntryStream<'_>;

    /// Collect [`entries()`](Self::entries) into a [`Vec`].
    async fn list(&self) -> Result<Vec<Entry>> {
        self.entries().try_collect().await
    }

    /// Get a child directory, creating it when `create` is set.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if it doesn't
    /// exist and `create` is unset, or [`TypeMismatch`](crate::error::ErrorKind::TypeMismatch)
    /// if the name is taken by a file.
    async fn directory(&self, name: &str, create: bool) -> Result<DirectoryRef>;

    /// Get a child file, creating an empty one when `create` is set.
    ///
    /// Creating never truncates an existing file.
    async fn file(&self, name: &str, create: bool) -> Result<FileRef>;

    /// Remove a child. Removing a non-empty directory requires `recursive`.
    async fn remove_entry(&self, name: &str, recursive: bool) -> Result<()>;
}

/// A file-shaped capability.
#[async_trait]
pub trait FileHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Location relative to the storage root.
    fn location(&self) -> &Path;

    /// Read the whole file.
    async fn read(&self) -> Result<Vec<u8>>;

    /// Open a sink that replaces the file's contents once closed.
    async fn writable(&self) -> Result<Box<dyn WritableSink>>;

    /// Whether both handles refer to the same underlying entry.
    ///
    /// Two handles obtained separately for the same entry compare equal;
    /// backends with a stronger notion of identity should override this.
    async fn is_same_entry(&self, other: &dyn FileHandle) -> Result<bool> {
        Ok(self.location() == other.location())
    }
}

/// Streaming writer returned by [`FileHandle::writable`].
///
/// Nothing is visible in the file until [`close()`](Self::close) succeeds.
/// Dropping a sink without closing it discards the written data.
#[async_trait]
pub trait WritableSink: Send {
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Commit everything written so far. Further writes fail with
    /// [`Closed`](crate::error::ErrorKind::Closed).
    async fn close(&mut self) -> Result<()>;
}
