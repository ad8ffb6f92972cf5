//! Error types for `webfm-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

use std::path::PathBuf;

/// Unified error type for all core operations.
///
/// Every operation either produces its payload or exactly one of these
/// variants; there is no partial-success shape for a single-file operation.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target file or directory does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// A directory exists but its contents cannot be enumerated.
    #[error("directory cannot be read: {0}")]
    DirCannotBeRead(PathBuf),

    /// A path is malformed or tries to escape the managed root
    /// (e.g. contains `..` segments).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A file or directory name is invalid (empty, contains separators, etc.).
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A rename/move/copy target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Image bytes could not be decoded or encoded.
    #[error("image processing failed: {0}")]
    ImageProcess(String),

    /// The cache tree rejected a write (disk full, permissions).
    #[error("unable to write preview into cache: {0}")]
    CacheWrite(PathBuf),

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout `webfm-core`.
pub type CoreResult<T> = Result<T, CoreError>;
