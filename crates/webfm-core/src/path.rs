//! Root-relative path handling.
//!
//! Every path the core accepts is relative to the single configured files
//! root and is normalised to a `/`-prefixed string (`"/photos/a.jpg"`).
//! Validation happens here, before any I/O touches disk.

use crate::error::{CoreError, CoreResult};

/// Normalises a client-supplied path to canonical root-relative form.
///
/// Backslashes become slashes, duplicate and trailing slashes are stripped,
/// and a leading slash is enforced. The root itself normalises to `"/"`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPath`] if the path contains a `..` segment,
/// a null byte, or an empty intermediate name after normalisation, any of
/// which could escape the managed root.
pub fn clean_path(path: &str) -> CoreResult<String> {
    if path.contains('\0') {
        return Err(CoreError::InvalidPath(path.to_string()));
    }

    let normalised = path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in normalised.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(CoreError::InvalidPath(path.to_string()));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Returns `true` if `name` is acceptable as a single file or directory name.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    !(name.contains('/') || name.contains('\\') || name.contains('\0'))
}

/// Joins a cleaned directory path and a name into a cleaned child path.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Returns the last component of a cleaned path (`"/"` yields `""`).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Returns the parent of a cleaned path (`"/a/b"` yields `"/a"`, `"/a"` yields `"/"`).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Returns the extension of a name, lowercased, without the dot.
pub fn ext(name: &str) -> Option<String> {
    let i = name.rfind('.')?;
    if i == 0 || i + 1 == name.len() {
        return None;
    }
    Some(name[i + 1..].to_lowercase())
}

/// Returns the name with its final extension removed.
pub fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[..i],
        _ => name,
    }
}
