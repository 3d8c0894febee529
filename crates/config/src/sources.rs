use crate::settings::{Settings, SourceConfig};
use async_trait::async_trait;
use shelf_storage::backend::LocalDirectory;
use shelf_storage::error::Result;
use shelf_storage::{SourceData, SourceStore, StorageSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A [`SourceStore`] backed by the `sources` table of [`Settings`].
#[derive(Clone, Debug, Default)]
pub struct ConfiguredSources {
    sources: BTreeMap<String, SourceConfig>,
}
impl ConfiguredSources {
    pub fn new(sources: BTreeMap<String, SourceConfig>) -> Self {
        Self { sources }
    }
}
impl From<&Settings> for ConfiguredSources {
    fn from(settings: &Settings) -> Self {
        Self::new(settings.sources.clone())
    }
}

#[async_trait]
impl SourceStore for ConfiguredSources {
    async fn get(&self, name: &str) -> Result<Option<StorageSource>> {
        let Some(config) = self.sources.get(name) else {
            return Ok(None);
        };
        let data = match config {
            SourceConfig::Local { path } if path.as_os_str().is_empty() => SourceData::Directory(None),
            SourceConfig::Local { path } => {
                debug!(source = name, path = %path.display(), "opening local storage source");
                SourceData::Directory(Some(Arc::new(LocalDirectory::new(path)?)))
            },
            SourceConfig::Blob => SourceData::Blob(Vec::new()),
        };
        Ok(Some(StorageSource {
            name: name.to_string(),
            data,
        }))
    }
}
