use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use shelf_handler::{HandlerSettings, SaveBehavior};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "shelf.toml";
pub const ENV_PREFIX: &str = "SHELF_";

/// How a named storage source is reached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    /// A directory on the local filesystem. An empty path means the source
    /// was declared but never pointed anywhere.
    Local {
        #[serde(default)]
        path: PathBuf,
    },
    /// A backend that is not filesystem-shaped.
    Blob,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the entry in `sources` the handler targets.
    pub storage_source: String,
    pub save_behavior: SaveBehavior,
    pub cache_storage_data: bool,
    pub ask_for_storage_unlock: bool,
    pub sources: BTreeMap<String, SourceConfig>,
}
impl Default for Settings {
    fn default() -> Self {
        let handler = HandlerSettings::default();
        Self {
            storage_source: handler.storage_source,
            save_behavior: handler.save_behavior,
            cache_storage_data: handler.cache_storage_data,
            ask_for_storage_unlock: handler.ask_for_storage_unlock,
            sources: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load from the platform configuration directory (if there is one) and
    /// the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path().as_deref())
    }

    /// Load from an explicit configuration file (if given) and the
    /// environment. A missing file contributes nothing.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let settings: Self = Self::figment(path)?.extract().or_raise(|| ErrorKind::Invalid)?;
        if !settings.storage_source.is_empty() && !settings.sources.contains_key(&settings.storage_source) {
            warn!(storage_source = %settings.storage_source, "storage source is not configured");
        }
        Ok(settings)
    }

    /// The merged provider stack, for callers that want to layer more on top.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            debug!(path = %path.display(), "loading configuration file");
            figment = match path.extension().and_then(|extension| extension.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            storage_source: self.storage_source.clone(),
            save_behavior: self.save_behavior,
            cache_storage_data: self.cache_storage_data,
            ask_for_storage_unlock: self.ask_for_storage_unlock,
        }
    }
}

/// `shelf.toml` inside the platform's configuration directory for shelf.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "shelf").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_| {
            let settings = Settings::load_from(None).unwrap();
            assert_eq!(settings, Settings::default());
            assert_eq!(settings.save_behavior, SaveBehavior::NewOnly);
            assert!(settings.cache_storage_data);
            assert!(!settings.ask_for_storage_unlock);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "shelf.toml",
                r#"
                    storage_source = "books"
                    save_behavior = "overwrite"

                    [sources.books]
                    kind = "local"
                    path = "/srv/books"

                    [sources.cloud]
                    kind = "blob"
                "#,
            )?;
            jail.set_env("SHELF_CACHE_STORAGE_DATA", "false");
            jail.set_env("SHELF_SOURCES__BOOKS__PATH", "/mnt/books");

            let settings = Settings::load_from(Some(Path::new("shelf.toml"))).unwrap();
            assert_eq!(settings.storage_source, "books");
            assert_eq!(settings.save_behavior, SaveBehavior::Overwrite);
            assert!(!settings.cache_storage_data);
            assert_eq!(settings.sources["books"], SourceConfig::Local {
                path: PathBuf::from("/mnt/books")
            });
            assert_eq!(settings.sources["cloud"], SourceConfig::Blob);

            let handler = settings.handler_settings();
            assert_eq!(handler.storage_source, "books");
            assert_eq!(handler.save_behavior, SaveBehavior::Overwrite);
            Ok(())
        });
    }

    #[rstest]
    #[case("shelf.yaml", "storage_source: books\nsave_behavior: new-only\n")]
    #[case("shelf.json", r#"{"storage_source": "books", "save_behavior": "new-only"}"#)]
    fn test_other_formats(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let settings = Settings::load_from(Some(Path::new(name))).unwrap();
            assert_eq!(settings.storage_source, "books");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_ignored() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("absent.toml");
            assert_eq!(Settings::load_from(Some(&path)).unwrap(), Settings::default());
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_format() {
        let err = Settings::figment(Some(Path::new("shelf.ini"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file("shelf.toml", r#"save_behavior = "sometimes""#)?;
            let err = Settings::load_from(Some(Path::new("shelf.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid));
            Ok(())
        });
    }
}
