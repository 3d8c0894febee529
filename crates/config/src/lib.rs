//! Layered settings for shelf storage handlers.
//!
//! Settings are merged from compiled defaults, an optional configuration file
//! and `SHELF_`-prefixed environment variables, in that order. Nested keys in
//! environment variables are separated with a double underscore:
//!
//! ```text
//! SHELF_STORAGE_SOURCE=books
//! SHELF_SOURCES__BOOKS__KIND=local
//! SHELF_SOURCES__BOOKS__PATH=/srv/books
//! ```

pub mod error;
mod settings;
mod sources;

pub use crate::settings::{CONFIG_FILE_NAME, ENV_PREFIX, Settings, SourceConfig, default_config_path};
pub use crate::sources::ConfiguredSources;
