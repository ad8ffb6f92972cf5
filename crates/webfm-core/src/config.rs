//! Application configuration loaded from a TOML file.
//!
//! All fields have defaults, so the core runs without a config file as
//! long as `[files] dir` points somewhere. [`Config::open`] wires the
//! configured stores into a ready-to-use [`Core`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::listing::DirectoryQueryEngine;
use crate::ops::FileOps;
use crate::preview::{FitMode, PreviewCache, PreviewOptions};
use crate::store::{LocalCacheStore, LocalSourceStore};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub listing: ListingConfig,
}

/// Location of the managed tree and its cache tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Root of the managed file tree.
    #[serde(default)]
    pub dir: PathBuf,
    /// Root of the cache tree. Defaults to `.cache` inside `dir`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// Default preview box and fit policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_width")]
    pub width: u32,
    #[serde(default = "default_preview_height")]
    pub height: u32,
    #[serde(default)]
    pub fit_mode: FitMode,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: default_preview_width(),
            height: default_preview_height(),
            fit_mode: FitMode::default(),
        }
    }
}

/// Listing defaults applied when a request leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_max_files")]
    pub default_max_files: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_max_files: default_max_files(),
        }
    }
}

fn default_preview_width() -> u32 {
    159
}

fn default_preview_height() -> u32 {
    139
}

fn default_max_files() -> usize {
    100
}

/// The assembled subsystem: preview cache, listing engine and file ops
/// sharing one pair of stores.
pub struct Core {
    pub previews: Arc<PreviewCache>,
    pub listing: DirectoryQueryEngine,
    pub ops: FileOps,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            _ => CoreError::Io(e),
        })?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Builds the local-disk stores and wires the [`Core`] on top of them.
    /// Both roots are created if missing.
    pub fn open(&self) -> CoreResult<Core> {
        if self.files.dir.as_os_str().is_empty() {
            return Err(CoreError::ConfigParse(
                "files.dir must be set".to_string(),
            ));
        }
        let cache_dir = self
            .files
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.files.dir.join(".cache"));
        std::fs::create_dir_all(&self.files.dir)?;
        std::fs::create_dir_all(&cache_dir)?;

        // Hide the cache tree from enumeration when it nests inside the
        // managed root.
        let hidden = match cache_dir.strip_prefix(&self.files.dir) {
            Ok(rel) if !rel.as_os_str().is_empty() => {
                vec![format!("/{}", rel.to_string_lossy().replace('\\', "/"))]
            }
            _ => Vec::new(),
        };

        let files = Arc::new(LocalSourceStore::new(self.files.dir.clone()));
        let cache = Arc::new(LocalCacheStore::new(cache_dir));
        let previews = Arc::new(PreviewCache::new(
            files.clone(),
            cache,
            PreviewOptions {
                width: self.preview.width,
                height: self.preview.height,
                fit_mode: self.preview.fit_mode,
            },
        ));
        let listing = DirectoryQueryEngine::new(
            files.clone(),
            previews.clone(),
            self.listing.default_max_files,
        );
        let ops = FileOps::new(files, previews.clone(), hidden);

        Ok(Core {
            previews,
            listing,
            ops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.preview.width, 159);
        assert_eq!(config.preview.height, 139);
        assert_eq!(config.preview.fit_mode, FitMode::ContainPad);
        assert_eq!(config.listing.default_max_files, 100);
        assert!(config.files.cache_dir.is_none());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [files]
            dir = "/srv/files"

            [preview]
            fit_mode = "cover"
            "#,
        )
        .unwrap();

        assert_eq!(config.files.dir, PathBuf::from("/srv/files"));
        assert_eq!(config.preview.fit_mode, FitMode::CoverCrop);
        assert_eq!(config.preview.width, 159);
        assert_eq!(config.listing.default_max_files, 100);
    }

    #[test]
    fn load_surfaces_parse_and_missing_file_errors() {
        let tmp = TempDir::new().unwrap();

        assert!(matches!(
            Config::load(&tmp.path().join("absent.toml")),
            Err(CoreError::NotFound(_))
        ));

        let bad = tmp.path().join("bad.toml");
        fs::write(&bad, "[files\n").unwrap();
        assert!(matches!(
            Config::load(&bad),
            Err(CoreError::ConfigParse(_))
        ));
    }

    #[test]
    fn open_requires_a_root_and_creates_trees() {
        let tmp = TempDir::new().unwrap();

        assert!(matches!(
            Config::default().open(),
            Err(CoreError::ConfigParse(_))
        ));

        let config = Config {
            files: FilesConfig {
                dir: tmp.path().join("files"),
                cache_dir: None,
            },
            ..Config::default()
        };
        let core = config.open().unwrap();
        assert!(tmp.path().join("files/.cache").is_dir());

        // Nested default cache dir stays out of enumeration.
        let dirs = core.ops.collect_directories().unwrap();
        assert_eq!(dirs, vec!["/"]);
    }

    #[test]
    fn external_cache_dir_is_not_hidden_from_anything() {
        let tmp = TempDir::new().unwrap();
        let config = Config {
            files: FilesConfig {
                dir: tmp.path().join("files"),
                cache_dir: Some(tmp.path().join("cache")),
            },
            ..Config::default()
        };
        let core = config.open().unwrap();
        assert!(tmp.path().join("cache").is_dir());
        assert_eq!(core.ops.collect_directories().unwrap(), vec!["/"]);
    }
}
