//! Storage-source configuration store.
//!
//! A storage source is a named backend instance. What gets persisted for it
//! is either a directory capability or, for backends that aren't
//! filesystem-shaped, an opaque blob of bytes.

use crate::backend::DirectoryRef;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tokio::sync::RwLock;

/// What a storage source has persisted.
#[derive(Clone)]
pub enum SourceData {
    /// A directory-shaped capability; `None` when nothing was ever stored.
    Directory(Option<DirectoryRef>),
    /// Serialized configuration of a non-filesystem backend.
    Blob(Vec<u8>),
}
impl Debug for SourceData {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Directory(Some(directory)) => f.debug_tuple("Directory").field(&directory.name()).finish(),
            Self::Directory(None) => f.write_str("Directory(None)"),
            Self::Blob(data) => f.debug_tuple("Blob").field(&data.len()).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageSource {
    pub name: String,
    pub data: SourceData,
}
impl StorageSource {
    pub fn directory(name: impl Into<String>, directory: DirectoryRef) -> Self {
        Self {
            name: name.into(),
            data: SourceData::Directory(Some(directory)),
        }
    }
}

/// Keyed lookup of configured storage sources.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Look up a source by name; `Ok(None)` when no such source is configured.
    async fn get(&self, name: &str) -> Result<Option<StorageSource>>;
}

/// A [`SourceStore`] kept in memory.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Arc<RwLock<HashMap<String, StorageSource>>>,
}
impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a source.
    pub async fn insert(&self, source: StorageSource) {
        self.sources.write().await.insert(source.name.clone(), source);
    }

    pub async fn remove(&self, name: &str) -> Option<StorageSource> {
        self.sources.write().await.remove(name)
    }
}

#[async_trait]
impl SourceStore for SourceRegistry {
    async fn get(&self, name: &str) -> Result<Option<StorageSource>> {
        Ok(self.sources.read().await.get(name).cloned())
    }
}
