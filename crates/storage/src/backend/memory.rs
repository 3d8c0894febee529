//! In-memory directory capability for testing.

use crate::backend::{AccessMode, DirectoryRef, Entry, EntryStream, FileRef, PermissionState, WritableSink};
use crate::error::{ErrorKind, Result};
use crate::path::{validate as validate_path, validate_name};
use crate::{DirectoryHandle, FileHandle};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

enum Node {
    Directory,
    File(Vec<u8>),
}

/// Everything a tree of memory handles shares.
struct State {
    /// Every entry below the root, keyed by location. The root itself is
    /// implicit (the empty path).
    nodes: BTreeMap<PathBuf, Node>,
    permission: PermissionState,
    /// What a permission request resolves to.
    request_answer: PermissionState,
    /// Remaining permission calls that fail with ActivationRequired.
    activation_failures: usize,
    failing_removals: HashSet<PathBuf>,
    failing_listings: HashSet<PathBuf>,
    listings: HashMap<PathBuf, usize>,
    permission_requests: usize,
}
impl State {
    fn is_directory(&self, location: &Path) -> bool {
        location.as_os_str().is_empty() || matches!(self.nodes.get(location), Some(Node::Directory))
    }

    fn children(&self, location: &Path) -> Vec<(String, PathBuf, bool)> {
        self.nodes
            .iter()
            .filter(|(path, _)| path.parent() == Some(location))
            .filter_map(|(path, node)| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some((name, path.clone(), matches!(node, Node::Directory)))
            })
            .collect()
    }
}

/// In-memory directory capability for testing.
///
/// Entries are stored in a map behind a [`RwLock`] shared by every handle
/// derived from the same root, so handles can be cloned and passed around
/// freely. Besides implementing [`DirectoryHandle`], the root offers knobs to
/// script the host's behaviour: permission answers, activation-required
/// failures, removal and listing failures, and listing counters.
///
/// # Examples
///
/// ```
/// use shelf_storage::backend::{DirectoryHandle, MemoryDirectory};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let root = MemoryDirectory::with_files([
///     ("Some Title/cover_png", b"..."),
/// ]);
/// assert!(root.directory("Some Title", false).await.is_ok());
/// assert_eq!(root.listing_count("").await, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryDirectory {
    state: Arc<RwLock<State>>,
    location: PathBuf,
    name: String,
}

impl MemoryDirectory {
    /// Create a memory root pre-populated with files; parent directories are
    /// created implicitly.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut nodes = BTreeMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MemoryDirectory is intended to
                // be used in tests; panics are expected. There is no error result.
                panic!("MemoryDirectory::with_files: invalid path {}", path.display());
            };
            for ancestor in validated.ancestors().skip(1) {
                if !ancestor.as_os_str().is_empty() {
                    nodes.insert(ancestor.to_path_buf(), Node::Directory);
                }
            }
            nodes.insert(validated, Node::File(data.into()));
        }
        Self {
            state: Arc::new(RwLock::new(State {
                nodes,
                permission: PermissionState::Granted,
                request_answer: PermissionState::Granted,
                activation_failures: 0,
                failing_removals: HashSet::new(),
                failing_listings: HashSet::new(),
                listings: HashMap::new(),
                permission_requests: 0,
            })),
            location: PathBuf::new(),
            name: "memory".to_string(),
        }
    }

    /// Change the name of the memory root.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the answer to permission queries.
    pub async fn set_permission(&self, state: PermissionState) {
        self.state.write().await.permission = state;
    }

    /// Set the answer a permission request resolves to. A granted request
    /// also grants subsequent queries, like a user clicking "allow".
    pub async fn set_request_answer(&self, state: PermissionState) {
        self.state.write().await.request_answer = state;
    }

    /// Make the next `times` permission calls fail with
    /// [`ActivationRequired`](ErrorKind::ActivationRequired).
    pub async fn require_activation(&self, times: usize) {
        self.state.write().await.activation_failures = times;
    }

    /// Make removing the entry at `path` fail.
    pub async fn fail_removal(&self, path: impl Into<PathBuf>) {
        self.state.write().await.failing_removals.insert(path.into());
    }

    /// Make enumerating the directory at `path` fail.
    pub async fn fail_listing(&self, path: impl Into<PathBuf>) {
        self.state.write().await.failing_listings.insert(path.into());
    }

    /// How many times the directory at `path` has been enumerated.
    pub async fn listing_count(&self, path: impl AsRef<Path>) -> usize {
        self.state.read().await.listings.get(path.as_ref()).copied().unwrap_or(0)
    }

    /// How many permission requests (prompts) were made.
    pub async fn permission_requests(&self) -> usize {
        self.state.read().await.permission_requests
    }

    /// Contents of the file at `path`, if there is one.
    pub async fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.state.read().await.nodes.get(path.as_ref()) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Names of the entries directly inside the directory at `path`, sorted.
    pub async fn names(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.state.read().await.children(path.as_ref()).into_iter().map(|(name, _, _)| name).collect()
    }

    fn child(&self, name: &str) -> Result<PathBuf> {
        Ok(self.location.join(validate_name(name)?))
    }

    fn child_directory(&self, name: &str, location: PathBuf) -> DirectoryRef {
        Arc::new(Self {
            state: self.state.clone(),
            location,
            name: name.to_string(),
        })
    }

    fn child_file(&self, name: &str, location: PathBuf) -> FileRef {
        Arc::new(MemoryFile {
            state: self.state.clone(),
            location,
            name: name.to_string(),
        })
    }

    async fn ensure_exists(&self) -> Result<()> {
        if !self.state.read().await.is_directory(&self.location) {
            exn::bail!(ErrorKind::NotFound(self.location.clone()));
        }
        Ok(())
    }
}
impl Default for MemoryDirectory {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Path {
        &self.location
    }

    async fn query_permission(&self, _mode: AccessMode) -> Result<PermissionState> {
        let mut state = self.state.write().await;
        if state.activation_failures > 0 {
            state.activation_failures -= 1;
            exn::bail!(ErrorKind::ActivationRequired);
        }
        Ok(state.permission)
    }

    async fn request_permission(&self, _mode: AccessMode) -> Result<PermissionState> {
        let mut state = self.state.write().await;
        state.permission_requests += 1;
        if state.activation_failures > 0 {
            state.activation_failures -= 1;
            exn::bail!(ErrorKind::ActivationRequired);
        }
        if state.request_answer == PermissionState::Granted {
            state.permission = PermissionState::Granted;
        }
        Ok(state.request_answer)
    }

    fn entries(&self) -> EntryStream<'_> {
        Box::pin(stream! {
            // Snapshot the children under the lock, then drop it before
            // yielding to avoid holding the lock across yield points.
            let children = {
                let mut state = self.state.write().await;
                *state.listings.entry(self.location.clone()).or_default() += 1;
                if state.failing_listings.contains(&self.location) {
                    Err(ErrorKind::BackendError(format!("listing failed: {}", self.location.display())))
                } else if !state.is_directory(&self.location) {
                    Err(ErrorKind::NotFound(self.location.clone()))
                } else {
                    Ok(state.children(&self.location))
                }
            };
            match children {
                Ok(children) => {
                    for (name, location, is_directory) in children {
                        yield Ok(match is_directory {
                            true => Entry::Directory(self.child_directory(&name, location)),
                            false => Entry::File(self.child_file(&name, location)),
                        });
                    }
                },
                Err(kind) => yield Err(exn::Exn::from(kind)),
            }
        })
    }

    async fn directory(&self, name: &str, create: bool) -> Result<DirectoryRef> {
        let location = self.child(name)?;
        self.ensure_exists().await?;
        let mut state = self.state.write().await;
        match state.nodes.get(&location) {
            Some(Node::Directory) => {},
            Some(Node::File(_)) => exn::bail!(ErrorKind::TypeMismatch(location)),
            None if create => {
                state.nodes.insert(location.clone(), Node::Directory);
            },
            None => exn::bail!(ErrorKind::NotFound(location)),
        }
        Ok(self.child_directory(name, location))
    }

    async fn file(&self, name: &str, create: bool) -> Result<FileRef> {
        let location = self.child(name)?;
        self.ensure_exists().await?;
        let mut state = self.state.write().await;
        match state.nodes.get(&location) {
            Some(Node::File(_)) => {},
            Some(Node::Directory) => exn::bail!(ErrorKind::TypeMismatch(location)),
            None if create => {
                state.nodes.insert(location.clone(), Node::File(Vec::new()));
            },
            None => exn::bail!(ErrorKind::NotFound(location)),
        }
        Ok(self.child_file(name, location))
    }

    async fn remove_entry(&self, name: &str, recursive: bool) -> Result<()> {
        let location = self.child(name)?;
        let mut state = self.state.write().await;
        if state.failing_removals.contains(&location) {
            exn::bail!(ErrorKind::BackendError(format!("removal failed: {}", location.display())));
        }
        match state.nodes.get(&location) {
            None => exn::bail!(ErrorKind::NotFound(location)),
            Some(Node::Directory) => {
                let has_children = state.nodes.keys().any(|path| path != &location && path.starts_with(&location));
                if has_children && !recursive {
                    exn::bail!(ErrorKind::BackendError(format!("directory not empty: {}", location.display())));
                }
                state.nodes.retain(|path, _| !path.starts_with(&location));
            },
            Some(Node::File(_)) => {
                state.nodes.remove(&location);
            },
        }
        Ok(())
    }
}

/// In-memory file capability, see [`MemoryDirectory`].
pub struct MemoryFile {
    state: Arc<RwLock<State>>,
    location: PathBuf,
    name: String,
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Path {
        &self.location
    }

    async fn read(&self) -> Result<Vec<u8>> {
        match self.state.read().await.nodes.get(&self.location) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Directory) => exn::bail!(ErrorKind::TypeMismatch(self.location.clone())),
            None => exn::bail!(ErrorKind::NotFound(self.location.clone())),
        }
    }

    async fn writable(&self) -> Result<Box<dyn WritableSink>> {
        Ok(Box::new(MemoryWritable {
            state: self.state.clone(),
            location: self.location.clone(),
            buffer: Some(Vec::new()),
        }))
    }
}

struct MemoryWritable {
    state: Arc<RwLock<State>>,
    location: PathBuf,
    buffer: Option<Vec<u8>>,
}

#[async_trait]
impl WritableSink for MemoryWritable {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        match self.buffer.as_mut() {
            Some(buffer) => {
                buffer.extend_from_slice(data);
                Ok(())
            },
            None => exn::bail!(ErrorKind::Closed(self.location.clone())),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(buffer) = self.buffer.take() else {
            exn::bail!(ErrorKind::Closed(self.location.clone()));
        };
        let mut state = self.state.write().await;
        if let Some(parent) = self.location.parent()
            && !state.is_directory(parent)
        {
            exn::bail!(ErrorKind::NotFound(parent.to_path_buf()));
        }
        state.nodes.insert(self.location.clone(), Node::File(buffer));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let root = MemoryDirectory::default();
        let directory = root.directory("Title", true).await.unwrap();
        let file = directory.file("cover_png", true).await.unwrap();
        let mut sink = file.writable().await.unwrap();
        sink.write(b"hello").await.unwrap();
        assert_eq!(file.read().await.unwrap(), b"");
        sink.close().await.unwrap();
        assert_eq!(file.read().await.unwrap(), b"hello");
        assert_eq!(root.contents("Title/cover_png").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_with_files_creates_parents() {
        let root = MemoryDirectory::with_files([("a/b/file", Vec::from(*b"1"))]);
        assert_eq!(root.names("").await, vec!["a"]);
        assert_eq!(root.names("a").await, vec!["b"]);
        let b = root.directory("a", false).await.unwrap().directory("b", false).await.unwrap();
        assert_eq!(b.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_counts_and_failures() {
        let root = MemoryDirectory::with_files([("Title/cover_png", Vec::from(*b"1"))]);
        root.list().await.unwrap();
        root.list().await.unwrap();
        assert_eq!(root.listing_count("").await, 2);
        root.fail_listing("Title").await;
        let title = root.directory("Title", false).await.unwrap();
        assert!(title.list().await.is_err());
        assert_eq!(root.listing_count("Title").await, 1);
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let root = MemoryDirectory::with_files([("A/x", Vec::from(*b"1")), ("B/y", Vec::from(*b"2"))]);
        assert!(root.remove_entry("A", false).await.is_err());
        root.remove_entry("A", true).await.unwrap();
        assert_eq!(root.names("").await, vec!["B"]);
        root.fail_removal("B").await;
        assert!(root.remove_entry("B", true).await.is_err());
        let err = root.remove_entry("C", true).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_permission_scripting() {
        let root = MemoryDirectory::default();
        root.set_permission(PermissionState::Prompt).await;
        root.require_activation(1).await;
        let err = root.query_permission(AccessMode::ReadWrite).await.unwrap_err();
        assert!(err.is_activation_required());
        assert_eq!(root.query_permission(AccessMode::ReadWrite).await.unwrap(), PermissionState::Prompt);
        assert_eq!(root.request_permission(AccessMode::ReadWrite).await.unwrap(), PermissionState::Granted);
        assert_eq!(root.query_permission(AccessMode::ReadWrite).await.unwrap(), PermissionState::Granted);
        assert_eq!(root.permission_requests().await, 1);
    }

    #[tokio::test]
    async fn test_same_entry() {
        let root = MemoryDirectory::default();
        let a = root.file("a", true).await.unwrap();
        let again = root.file("a", false).await.unwrap();
        let b = root.file("b", true).await.unwrap();
        assert!(a.is_same_entry(again.as_ref()).await.unwrap());
        assert!(!a.is_same_entry(b.as_ref()).await.unwrap());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MemoryDirectory::with_files([("../escape", Vec::from(*b"bad"))]);
    }
}
