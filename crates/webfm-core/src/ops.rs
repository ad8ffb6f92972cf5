//! File operations exposed to the request router: delete, rename, move,
//! copy, directory creation and directory enumeration.
//!
//! These are thin pass-throughs to the source store, plus the two pieces
//! of bookkeeping the store cannot do itself: dropping stale preview
//! cache entries, and deleting the format-variant siblings of a deleted
//! owner file.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::media;
use crate::path;
use crate::preview::PreviewCache;
use crate::store::SourceFileStore;

/// Extensions a format variant of an image owner may carry.
const VARIANT_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

pub struct FileOps {
    files: Arc<dyn SourceFileStore>,
    previews: Arc<PreviewCache>,
    /// Root-relative paths hidden from directory enumeration, typically
    /// the cache tree when it nests inside the managed root.
    hidden: Vec<String>,
}

impl FileOps {
    pub fn new(
        files: Arc<dyn SourceFileStore>,
        previews: Arc<PreviewCache>,
        hidden: Vec<String>,
    ) -> Self {
        Self {
            files,
            previews,
            hidden,
        }
    }

    /// Deletes each path. Deleting an image owner also deletes any of its
    /// format-variant siblings (`stem + suffix + ext`), and every deleted
    /// file's cache entry is dropped.
    pub fn delete_files(&self, paths: &[String], format_suffixes: &[String]) -> CoreResult<()> {
        for raw in paths {
            let target = path::clean_path(raw)?;
            self.files.delete(&target)?;
            self.previews.invalidate(&target)?;

            let name = path::file_name(&target);
            if !media::is_image(name) {
                continue;
            }
            let dir = path::parent(&target);
            let stem = path::stem(name);
            for suffix in format_suffixes {
                for ext in VARIANT_EXTENSIONS {
                    let sibling = path::join(dir, &format!("{stem}{suffix}.{ext}"));
                    if self.files.exists(&sibling) {
                        self.files.delete(&sibling)?;
                        self.previews.invalidate(&sibling)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Renames a file or directory in place. Returns the new path.
    pub fn rename(&self, source_path: &str, new_name: &str) -> CoreResult<String> {
        let source_path = path::clean_path(source_path)?;
        if !path::is_valid_name(new_name) {
            return Err(CoreError::InvalidName(new_name.to_string()));
        }
        let new_path = path::join(path::parent(&source_path), new_name);
        self.files.rename(&source_path, &new_path)?;
        self.previews.invalidate(&source_path)?;
        Ok(new_path)
    }

    /// Moves each path into `target_dir`, keeping its name.
    pub fn move_files(&self, paths: &[String], target_dir: &str) -> CoreResult<()> {
        let target_dir = path::clean_path(target_dir)?;
        for raw in paths {
            let source = path::clean_path(raw)?;
            let destination = path::join(&target_dir, path::file_name(&source));
            self.files.rename(&source, &destination)?;
            self.previews.invalidate(&source)?;
        }
        Ok(())
    }

    /// Copies each path (file or directory) into `target_dir`.
    pub fn copy_files(&self, paths: &[String], target_dir: &str) -> CoreResult<()> {
        let target_dir = path::clean_path(target_dir)?;
        for raw in paths {
            let source = path::clean_path(raw)?;
            let destination = path::join(&target_dir, path::file_name(&source));
            self.files.copy(&source, &destination)?;
        }
        Ok(())
    }

    /// Creates a directory under `parent`. Returns the new path.
    pub fn create_dir(&self, parent: &str, name: &str) -> CoreResult<String> {
        let parent = path::clean_path(parent)?;
        if !path::is_valid_name(name) {
            return Err(CoreError::InvalidName(name.to_string()));
        }
        let new_path = path::join(&parent, name);
        if self.files.exists(&new_path) {
            return Err(CoreError::AlreadyExists(new_path.into()));
        }
        self.files.make_dir(&new_path)?;
        Ok(new_path)
    }

    /// Enumerates every directory under the root as cleaned paths, the
    /// root itself included, skipping hidden trees. Worklist traversal,
    /// no recursion.
    pub fn collect_directories(&self) -> CoreResult<Vec<String>> {
        let mut dirs = Vec::new();
        let mut work = vec!["/".to_string()];
        while let Some(dir) = work.pop() {
            let entries = self.files.list(&dir)?;
            for entry in entries {
                if !entry.is_dir {
                    continue;
                }
                let child = path::join(&dir, &entry.name);
                if self.hidden.iter().any(|h| h == &child) {
                    continue;
                }
                work.push(child);
            }
            dirs.push(dir);
        }
        dirs.sort_by(|a, b| crate::listing::natural_cmp(a, b));
        Ok(dirs)
    }
}
