//! Acquire and cache the capability for a storage source's root directory.

use crate::error::{ErrorKind, Result, StorageResultExt};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use shelf_storage::{AccessMode, DirectoryRef, PermissionState, SourceData, SourceStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// What the user is shown when the host needs them to unlock storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnlockRequest {
    pub description: String,
    pub action: String,
    pub requires_secret: bool,
}
impl Default for UnlockRequest {
    fn default() -> Self {
        Self {
            description: "You are trying to access data on your filesystem".to_string(),
            action: "Please grant permissions in the next dialog".to_string(),
            requires_secret: false,
        }
    }
}

/// Interactive resolver that gets the user to perform whatever gesture the
/// host requires. Returns once the user is done, whatever the outcome.
#[async_trait]
pub trait UnlockPrompt: Send + Sync {
    async fn unlock(&self, request: UnlockRequest);
}

/// Holds the root capability of the configured storage source.
pub struct PermissionGate {
    sources: Arc<dyn SourceStore>,
    prompt: Option<Arc<dyn UnlockPrompt>>,
    root: RwLock<Option<DirectoryRef>>,
}
impl PermissionGate {
    pub fn new(sources: Arc<dyn SourceStore>) -> Self {
        Self {
            sources,
            prompt: None,
            root: RwLock::new(None),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn UnlockPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub async fn is_cached(&self) -> bool {
        self.root.read().await.is_some()
    }

    /// Forget the cached root; the next call re-resolves it from the store.
    pub async fn clear(&self) {
        *self.root.write().await = None;
    }

    /// Return the root capability of `source`, with read-write access.
    ///
    /// When the host says a user gesture is needed, and either nothing is
    /// cached yet or `allow_interactive_unlock` is set, the unlock prompt is
    /// awaited and acquisition is retried once without it. A second refusal
    /// is reported as [`PermissionDenied`](ErrorKind::PermissionDenied).
    #[instrument(skip(self))]
    pub async fn ensure_root(&self, source: &str, allow_interactive_unlock: bool) -> Result<DirectoryRef> {
        let mut allow_unlock = allow_interactive_unlock;
        let mut prompted = false;
        loop {
            let cached = self.is_cached().await;
            match self.acquire(source).await {
                Err(err) if matches!(&*err, ErrorKind::InteractiveUnlockRequired) && (!cached || allow_unlock) => {
                    if prompted {
                        return Err(err).or_raise(|| ErrorKind::PermissionDenied(source.to_string()));
                    }
                    let Some(prompt) = &self.prompt else {
                        return Err(err);
                    };
                    info!(source, "asking the user to unlock storage");
                    prompt.unlock(UnlockRequest::default()).await;
                    prompted = true;
                    allow_unlock = false;
                },
                result => return result,
            }
        }
    }

    async fn acquire(&self, source: &str) -> Result<DirectoryRef> {
        if let Some(root) = self.root.read().await.clone() {
            verify_permission(&root, source).await?;
            debug!(source, "using cached storage root");
            return Ok(root);
        }
        let found = self
            .sources
            .get(source)
            .await
            .or_storage()?
            .ok_or_raise(|| ErrorKind::SourceNotFound(source.to_string()))?;
        let root = match found.data {
            SourceData::Blob(_) => exn::bail!(ErrorKind::WrongHandleKind(source.to_string())),
            SourceData::Directory(None) => exn::bail!(ErrorKind::HandleMissing(source.to_string())),
            SourceData::Directory(Some(root)) => root,
        };
        verify_permission(&root, source).await?;
        *self.root.write().await = Some(root.clone());
        Ok(root)
    }
}

async fn verify_permission(root: &DirectoryRef, source: &str) -> Result<()> {
    if root.query_permission(AccessMode::ReadWrite).await.or_storage()? == PermissionState::Granted {
        return Ok(());
    }
    if root.request_permission(AccessMode::ReadWrite).await.or_storage()? == PermissionState::Granted {
        return Ok(());
    }
    exn::bail!(ErrorKind::PermissionDenied(source.to_string()))
}
