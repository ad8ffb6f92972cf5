//! Local-disk drivers for [`SourceFileStore`] and [`CacheStore`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{CoreError, CoreResult};
use crate::path::clean_path;
use crate::store::{CacheStore, SourceEntry, SourceFileStore, SourceStat};

/// Maps a cleaned root-relative path onto the driver's root directory.
fn resolve(root: &Path, rel: &str) -> CoreResult<PathBuf> {
    let cleaned = clean_path(rel)?;
    if cleaned == "/" {
        return Ok(root.to_path_buf());
    }
    Ok(root.join(&cleaned[1..]))
}

fn mtime_secs(time: SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Read/write view of a local directory tree.
pub struct LocalSourceStore {
    root: PathBuf,
}

impl LocalSourceStore {
    /// Creates a store rooted at `root`. The directory is not required to
    /// exist yet; every operation resolves against it lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The absolute root directory of the managed tree.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceFileStore for LocalSourceStore {
    fn stat(&self, path: &str) -> CoreResult<SourceStat> {
        let abs = resolve(&self.root, path)?;
        let meta = fs::metadata(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(abs.clone())
            } else {
                CoreError::Io(e)
            }
        })?;
        Ok(SourceStat {
            size: if meta.is_dir() { 0 } else { meta.len() },
            mtime: meta.modified().map(mtime_secs).unwrap_or(0),
        })
    }

    fn read(&self, path: &str) -> CoreResult<Vec<u8>> {
        let abs = resolve(&self.root, path)?;
        fs::read(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(abs.clone())
            } else {
                CoreError::Io(e)
            }
        })
    }

    fn list(&self, dir: &str) -> CoreResult<Vec<SourceEntry>> {
        let abs = resolve(&self.root, dir)?;
        if !abs.exists() {
            return Err(CoreError::NotFound(abs));
        }
        if !abs.is_dir() {
            return Err(CoreError::DirCannotBeRead(abs));
        }

        let read_dir = fs::read_dir(&abs).map_err(|_| CoreError::DirCannotBeRead(abs.clone()))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let meta = match dir_entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            entries.push(SourceEntry {
                name: crate::nfc_string(&dir_entry.file_name().to_string_lossy()),
                size: if meta.is_dir() { 0 } else { meta.len() },
                mtime: meta.modified().map(mtime_secs).unwrap_or(0),
                is_dir: meta.is_dir(),
            });
        }
        Ok(entries)
    }

    fn exists(&self, path: &str) -> bool {
        resolve(&self.root, path)
            .map(|abs| abs.exists())
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> CoreResult<()> {
        let abs = resolve(&self.root, path)?;
        let meta = fs::symlink_metadata(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(abs.clone())
            } else {
                CoreError::Io(e)
            }
        })?;

        if meta.is_dir() {
            delete_tree(&abs)?;
        } else {
            fs::remove_file(&abs)?;
        }
        Ok(())
    }

    fn rename(&self, path: &str, new_path: &str) -> CoreResult<()> {
        let from = resolve(&self.root, path)?;
        let to = resolve(&self.root, new_path)?;

        if fs::symlink_metadata(&from).is_err() {
            return Err(CoreError::NotFound(from));
        }
        if to.exists() {
            return Err(CoreError::AlreadyExists(to));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::rename(&from, &to) {
            Ok(()) => Ok(()),
            Err(_) => {
                // cross-device fallback
                self.copy(path, new_path)?;
                self.delete(path)
            }
        }
    }

    fn copy(&self, path: &str, new_path: &str) -> CoreResult<()> {
        let from = resolve(&self.root, path)?;
        let to = resolve(&self.root, new_path)?;

        let meta = fs::symlink_metadata(&from).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(from.clone())
            } else {
                CoreError::Io(e)
            }
        })?;
        if to.exists() {
            return Err(CoreError::AlreadyExists(to));
        }

        if meta.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&from, &to)?;
        }
        Ok(())
    }

    fn make_dir(&self, path: &str) -> CoreResult<()> {
        let abs = resolve(&self.root, path)?;
        fs::create_dir_all(&abs)?;
        Ok(())
    }
}

/// Deletes a directory tree with an explicit worklist instead of recursion,
/// so arbitrarily deep trees cannot exhaust the stack.
fn delete_tree(root: &Path) -> CoreResult<()> {
    let mut dirs = vec![root.to_path_buf()];
    let mut visited = Vec::new();

    while let Some(dir) = dirs.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let ft = entry.file_type()?;
            if ft.is_dir() {
                dirs.push(entry.path());
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        visited.push(dir);
    }

    // Children were pushed after their parents, so reverse order is safe.
    for dir in visited.into_iter().rev() {
        fs::remove_dir(&dir)?;
    }
    Ok(())
}

/// Copies a directory tree with an explicit worklist instead of recursion.
/// Symlinks are copied as links where the platform supports it.
fn copy_tree(src: &Path, dest: &Path) -> CoreResult<()> {
    let mut work = vec![(src.to_path_buf(), dest.to_path_buf())];

    while let Some((from, to)) = work.pop() {
        fs::create_dir_all(&to)?;
        for entry in fs::read_dir(&from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            let ft = entry.file_type()?;
            if ft.is_dir() {
                work.push((entry.path(), target));
            } else if ft.is_symlink() {
                let link_target = fs::read_link(entry.path())?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&link_target, &target)?;
                #[cfg(not(unix))]
                {
                    let _ = link_target;
                    fs::copy(entry.path(), &target)?;
                }
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}

/// Blob store over a local cache directory.
pub struct LocalCacheStore {
    root: PathBuf,
}

impl LocalCacheStore {
    /// Creates a cache store rooted at `root`. Directories are created on
    /// demand by [`CacheStore::put`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The absolute root directory of the cache tree.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CacheStore for LocalCacheStore {
    fn exists(&self, key: &str) -> bool {
        resolve(&self.root, key)
            .map(|abs| abs.is_file())
            .unwrap_or(false)
    }

    fn get(&self, key: &str) -> CoreResult<Vec<u8>> {
        let abs = resolve(&self.root, key)?;
        fs::read(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotFound(abs.clone())
            } else {
                CoreError::Io(e)
            }
        })
    }

    fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()> {
        let abs = resolve(&self.root, key)?;
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|_| CoreError::CacheWrite(abs.clone()))?;
        }

        // Write-then-rename so a concurrent reader never sees a torn file.
        let file_name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CoreError::CacheWrite(abs.clone()))?;
        static TMP_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = TMP_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let tmp = abs.with_file_name(format!("{file_name}.tmp{}-{seq}", std::process::id()));
        fs::write(&tmp, bytes).map_err(|_| CoreError::CacheWrite(abs.clone()))?;
        fs::rename(&tmp, &abs).map_err(|_| {
            let _ = fs::remove_file(&tmp);
            CoreError::CacheWrite(abs.clone())
        })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> CoreResult<()> {
        let abs = resolve(&self.root, key)?;
        match fs::remove_file(&abs) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    fn last_modified(&self, key: &str) -> Option<i64> {
        let abs = resolve(&self.root, key).ok()?;
        let meta = fs::metadata(&abs).ok()?;
        meta.modified().ok().map(mtime_secs)
    }
}
