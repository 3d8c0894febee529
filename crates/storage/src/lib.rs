pub mod backend;
pub mod error;
mod path;
mod source;

pub use crate::backend::{AccessMode, DirectoryHandle, DirectoryRef, Entry, FileHandle, FileRef, PermissionState, WritableSink};
pub use crate::path::{validate as validate_path, validate_name};
pub use crate::source::{SourceData, SourceRegistry, SourceStore, StorageSource};
