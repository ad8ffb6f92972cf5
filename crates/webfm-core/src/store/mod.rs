//! Storage abstractions for the managed file tree and the preview cache.
//!
//! Implementations are injected by constructor ([`crate::config::Config::open`]
//! builds the local-disk pair); nothing in the core selects a driver at
//! runtime by name. All paths and keys are cleaned root-relative strings
//! (see [`crate::path::clean_path`]).

pub mod local;

pub use local::{LocalCacheStore, LocalSourceStore};

use crate::error::CoreResult;

/// Identity snapshot of a source file, taken at use time.
///
/// `mtime` is seconds since the Unix epoch. Two files (or two generations
/// of the same file) with equal `(size, mtime)` are treated as identical
/// for cache-validity purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStat {
    pub size: u64,
    pub mtime: i64,
}

/// One row of a shallow directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// NFC-normalised file or directory name.
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub is_dir: bool,
}

/// Read/write view of the managed file tree.
///
/// Local disk is the baseline implementation; remote backends (S3 etc.)
/// would implement the same trait.
pub trait SourceFileStore: Send + Sync {
    /// Stats a single file.
    fn stat(&self, path: &str) -> CoreResult<SourceStat>;

    /// Reads the full contents of a file.
    fn read(&self, path: &str) -> CoreResult<Vec<u8>>;

    /// Enumerates the immediate children of a directory (one shallow scan,
    /// not recursive). Order is unspecified.
    fn list(&self, dir: &str) -> CoreResult<Vec<SourceEntry>>;

    /// Returns `true` if a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Deletes a file, or a directory with all of its contents.
    fn delete(&self, path: &str) -> CoreResult<()>;

    /// Moves a file or directory to a new cleaned path.
    fn rename(&self, path: &str, new_path: &str) -> CoreResult<()>;

    /// Copies a file, or a directory with all of its contents.
    fn copy(&self, path: &str, new_path: &str) -> CoreResult<()>;

    /// Creates a directory (and missing parents).
    fn make_dir(&self, path: &str) -> CoreResult<()>;
}

/// Key/value blob store backing the preview cache.
///
/// Keys are root-relative paths inside a dedicated cache tree. Parent
/// directories are created on demand by `put`.
pub trait CacheStore: Send + Sync {
    /// Returns `true` if a blob exists at `key`.
    fn exists(&self, key: &str) -> bool;

    /// Reads a blob.
    fn get(&self, key: &str) -> CoreResult<Vec<u8>>;

    /// Writes a blob atomically: a concurrent reader observes either the
    /// previous blob or the complete new one, never a truncated file.
    fn put(&self, key: &str, bytes: &[u8]) -> CoreResult<()>;

    /// Deletes a blob. Deleting a missing key is a no-op, not an error,
    /// since invalidation logic deletes speculatively.
    fn delete(&self, key: &str) -> CoreResult<()>;

    /// Returns the blob's modification time (seconds since epoch), if the
    /// key exists.
    fn last_modified(&self, key: &str) -> Option<i64>;
}
