//! Local filesystem directory capability.
//!
//! Wraps a directory on the local filesystem, accessed with `tokio::fs` for
//! async I/O. Writes go to a hidden swap file next to the target and are
//! renamed over it on close, so readers never observe a half-written file.

use crate::backend::{AccessMode, DirectoryRef, Entry, EntryStream, FileRef, PermissionState, WritableSink};
use crate::error::{ErrorKind, Result};
use crate::path::validate_name;
use crate::{DirectoryHandle, FileHandle};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, DirEntry, OpenOptions};
use tokio::io::AsyncWriteExt;

const SWAP_SUFFIX: &str = ".swap";

/// Local filesystem directory.
///
/// # Examples
///
/// ```no_run
/// use shelf_storage::backend::LocalDirectory;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let root = LocalDirectory::new("/path/to/library")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalDirectory {
    /// Absolute path of the storage root this handle was derived from
    root: Arc<PathBuf>,
    location: PathBuf,
    name: String,
}
impl LocalDirectory {
    /// Create a capability for the directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists but is not a
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidName(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::TypeMismatch(root));
            }
        } else {
            // Use non-async here; it'll only happen once when a source is
            // configured and it's not worth making the constructor async.
            sync_create_dir(&root).map_err(|e| map_io_error(e, &root))?;
        }
        let name = root.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(Self {
            root: Arc::new(root),
            location: PathBuf::new(),
            name,
        })
    }

    fn absolute_path(&self) -> PathBuf {
        self.root.join(&self.location)
    }

    /// Relative and absolute locations of a named child.
    fn child(&self, name: &str) -> Result<(PathBuf, PathBuf)> {
        let relative = self.location.join(validate_name(name)?);
        let absolute = self.root.join(&relative);
        Ok((relative, absolute))
    }

    fn child_directory(&self, name: &str, location: PathBuf) -> DirectoryRef {
        Arc::new(Self {
            root: self.root.clone(),
            location,
            name: name.to_string(),
        })
    }

    fn child_file(&self, name: &str, location: PathBuf) -> FileRef {
        Arc::new(LocalFile {
            root: self.root.clone(),
            location,
            name: name.to_string(),
        })
    }

    async fn process_entry(&self, entry: DirEntry) -> Result<Option<Entry>> {
        let name = entry.file_name().to_string_lossy().into_owned();
        let (relative, absolute) = self.child(&name)?;
        // Follows symlinks, unlike DirEntry::file_type().
        let metadata = entry.metadata().await.map_err(|e| map_io_error(e, &absolute))?;
        if metadata.is_dir() {
            return Ok(Some(Entry::Directory(self.child_directory(&name, relative))));
        }
        if metadata.is_file() {
            return Ok(Some(Entry::File(self.child_file(&name, relative))));
        }
        // Note: silently drop what is most likely a broken symlink.
        Ok(None)
    }

    async fn permission(&self, mode: AccessMode) -> Result<PermissionState> {
        let path = self.absolute_path();
        let metadata = fs::metadata(&path).await.map_err(|e| map_io_error(e, &path))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::TypeMismatch(path));
        }
        Ok(match (mode, metadata.permissions().readonly()) {
            (AccessMode::ReadWrite, true) => PermissionState::Denied,
            _ => PermissionState::Granted,
        })
    }
}

fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

#[async_trait]
impl DirectoryHandle for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Path {
        &self.location
    }

    async fn query_permission(&self, mode: AccessMode) -> Result<PermissionState> {
        self.permission(mode).await
    }

    // There is nobody to ask on a plain filesystem; the answer is whatever
    // the file mode says.
    async fn request_permission(&self, mode: AccessMode) -> Result<PermissionState> {
        self.permission(mode).await
    }

    fn entries(&self) -> EntryStream<'_> {
        let current = self.absolute_path();
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) => {
                    yield Err(exn::Exn::from(map_io_error(err, &current)));
                    return;
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(exn::Exn::from(map_io_error(e, &current)));
                        return;
                    },
                };
                match self.process_entry(entry).await {
                    Ok(Some(entry)) => yield Ok(entry),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn directory(&self, name: &str, create: bool) -> Result<DirectoryRef> {
        let (relative, absolute) = self.child(name)?;
        if create {
            match fs::create_dir(&absolute).await {
                Ok(()) => return Ok(self.child_directory(name, relative)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {},
                Err(e) => exn::bail!(map_io_error(e, &absolute)),
            }
        }
        let metadata = fs::metadata(&absolute).await.map_err(|e| map_io_error(e, &absolute))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::TypeMismatch(absolute));
        }
        Ok(self.child_directory(name, relative))
    }

    async fn file(&self, name: &str, create: bool) -> Result<FileRef> {
        let (relative, absolute) = self.child(name)?;
        if create {
            // No truncate: an existing file keeps its contents until a
            // writable sink is closed over it.
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&absolute)
                .await
                .map_err(|e| map_io_error(e, &absolute))?;
        }
        let metadata = fs::metadata(&absolute).await.map_err(|e| map_io_error(e, &absolute))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::TypeMismatch(absolute));
        }
        Ok(self.child_file(name, relative))
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> Result<()> {
        let (_, absolute) = self.child(name)?;
        let metadata = fs::metadata(&absolute).await.map_err(|e| map_io_error(e, &absolute))?;
        let removed = match (metadata.is_dir(), recursive) {
            (true, true) => fs::remove_dir_all(&absolute).await,
            (true, false) => fs::remove_dir(&absolute).await,
            (false, _) => fs::remove_file(&absolute).await,
        };
        Ok(removed.map_err(|e| map_io_error(e, &absolute))?)
    }
}

/// Local filesystem file.
#[derive(Clone, Debug)]
pub struct LocalFile {
    root: Arc<PathBuf>,
    location: PathBuf,
    name: String,
}

#[async_trait]
impl FileHandle for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Path {
        &self.location
    }

    async fn read(&self) -> Result<Vec<u8>> {
        let path = self.root.join(&self.location);
        Ok(fs::read(&path).await.map_err(|e| map_io_error(e, &path))?)
    }

    async fn writable(&self) -> Result<Box<dyn WritableSink>> {
        let target = self.root.join(&self.location);
        let swap = target.with_file_name(format!(".{}{SWAP_SUFFIX}", self.name));
        let file = fs::File::create(&swap).await.map_err(|e| map_io_error(e, &swap))?;
        Ok(Box::new(LocalWritable {
            file: Some(file),
            swap,
            target,
        }))
    }
}

/// Swap-file writer; renamed over the target on close.
struct LocalWritable {
    file: Option<fs::File>,
    swap: PathBuf,
    target: PathBuf,
}

#[async_trait]
impl WritableSink for LocalWritable {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            exn::bail!(ErrorKind::Closed(self.target.clone()));
        };
        Ok(file.write_all(data).await.map_err(|e| map_io_error(e, &self.swap))?)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            exn::bail!(ErrorKind::Closed(self.target.clone()));
        };
        file.flush().await.map_err(|e| map_io_error(e, &self.swap))?;
        file.sync_all().await.map_err(|e| map_io_error(e, &self.swap))?;
        drop(file);
        Ok(fs::rename(&self.swap, &self.target).await.map_err(|e| map_io_error(e, &self.target))?)
    }
}
impl Drop for LocalWritable {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            // Never closed: throw the uncommitted data away.
            let _ = std::fs::remove_file(&self.swap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(file: &FileRef, data: &[u8]) {
        let mut sink = file.writable().await.unwrap();
        sink.write(data).await.unwrap();
        sink.close().await.unwrap();
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalDirectory::new(temp_dir.path()).is_ok());
        assert!(LocalDirectory::new("relative/path").is_err());
        assert!(LocalDirectory::new("./relative").is_err());
    }

    #[test]
    fn test_new_rejects_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("file");
        std::fs::write(&path, b"data").unwrap();
        let err = LocalDirectory::new(&path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::TypeMismatch(_)));
    }

    #[tokio::test]
    async fn test_permission_granted() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        assert_eq!(root.query_permission(AccessMode::ReadWrite).await.unwrap(), PermissionState::Granted);
        assert_eq!(root.request_permission(AccessMode::Read).await.unwrap(), PermissionState::Granted);
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let directory = root.directory("Title", true).await.unwrap();
        let file = directory.file("progress_1-0.5", true).await.unwrap();
        write(&file, b"{}").await;
        assert_eq!(file.read().await.unwrap(), b"{}");
        assert_eq!(file.location(), Path::new("Title/progress_1-0.5"));
        assert!(temp_dir.path().join("Title/progress_1-0.5").is_file());
        assert!(!temp_dir.path().join("Title/.progress_1-0.5.swap").exists());
    }

    #[tokio::test]
    async fn test_write_is_invisible_until_closed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let file = root.file("cover_png", true).await.unwrap();
        write(&file, b"old").await;
        let mut sink = file.writable().await.unwrap();
        sink.write(b"new").await.unwrap();
        assert_eq!(file.read().await.unwrap(), b"old");
        sink.close().await.unwrap();
        assert_eq!(file.read().await.unwrap(), b"new");
        let err = sink.write(b"more").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Closed(_)));
    }

    #[tokio::test]
    async fn test_dropped_sink_discards_data() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let file = root.file("cover_png", true).await.unwrap();
        let mut sink = file.writable().await.unwrap();
        sink.write(b"lost").await.unwrap();
        drop(sink);
        assert_eq!(file.read().await.unwrap(), b"");
        assert_eq!(root.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_create_does_not_truncate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let file = root.file("a", true).await.unwrap();
        write(&file, b"keep").await;
        let again = root.file("a", true).await.unwrap();
        assert_eq!(again.read().await.unwrap(), b"keep");
        assert!(file.is_same_entry(again.as_ref()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let err = root.directory("missing", false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = root.file("missing", false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = root.remove_entry("missing", true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_entries_end_after_an_error() {
        use futures::StreamExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let gone = root.directory("gone", true).await.unwrap();
        root.remove_entry("gone", true).await.unwrap();
        let items: Vec<_> = gone.entries().collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(&**items[0].as_ref().unwrap_err(), ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        root.file("taken", true).await.unwrap();
        let err = root.directory("taken", true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TypeMismatch(_)));
        root.directory("folder", true).await.unwrap();
        let err = root.file("folder", false).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::TypeMismatch(_)));
    }

    #[tokio::test]
    async fn test_entries_are_typed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        root.directory("Book A", true).await.unwrap();
        root.directory("Book B", true).await.unwrap();
        root.file("stray.txt", true).await.unwrap();
        let entries = root.list().await.unwrap();
        assert_eq!(entries.len(), 3);
        let directories = entries.iter().filter(|e| matches!(e, Entry::Directory(_))).count();
        assert_eq!(directories, 2);
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        let directory = root.directory("Title", true).await.unwrap();
        write(&directory.file("cover_png", true).await.unwrap(), b"png").await;
        // Non-empty directories need recursive removal.
        assert!(root.remove_entry("Title", false).await.is_err());
        root.remove_entry("Title", true).await.unwrap();
        assert!(!temp_dir.path().join("Title").exists());
    }

    #[tokio::test]
    async fn test_name_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = LocalDirectory::new(temp_dir.path()).unwrap();
        assert!(root.directory("..", true).await.is_err());
        assert!(root.file("../escape", true).await.is_err());
        assert!(root.remove_entry("a/b", true).await.is_err());
    }
}
