//! Cursor-paginated directory listing with filtering, natural-order
//! sorting and format-variant association.
//!
//! One shallow scan per request. Variant files (owner base name plus a
//! recognized suffix, e.g. `photo-small.jpg` for `photo.jpg`) are pulled
//! out of the top-level rows and re-attached under their owner's
//! `formats` map. Per-row metadata comes from the preview sidecars, read
//! in parallel, and never triggers a render.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::media;
use crate::path;
use crate::preview::PreviewCache;
use crate::store::{SourceEntry, SourceFileStore};

/// Primary sort field. The other two fields tie-break in a fixed order,
/// see [`sort_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Name,
    Date,
    Size,
}

/// Everything a listing call needs, passed explicitly per request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub dir: String,
    /// Page size. `None` falls back to the engine's configured default.
    pub max_files: Option<usize>,
    /// Cursor by name. Takes priority over [`Self::last_index`].
    pub last_file: Option<String>,
    /// Cursor by position in the sorted list.
    pub last_index: Option<usize>,
    /// Case-insensitive globs. Non-empty means keep matches only.
    pub whitelist: Vec<String>,
    /// Case-insensitive globs. A match removes the file.
    pub blacklist: Vec<String>,
    /// Single case-sensitive glob; empty means no filtering.
    pub filter: String,
    pub order_by: OrderBy,
    pub ascending: bool,
    /// Paired with [`Self::format_suffixes`] by index.
    pub format_ids: Vec<String>,
    pub format_suffixes: Vec<String>,
    /// Names forced onto the returned page regardless of sort position.
    pub always_include: Vec<String>,
}

/// One listing row. Dimensions and placeholder hash are present only if
/// the file's preview has been rendered at least once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedFile {
    pub name: String,
    pub size: u64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub formats: BTreeMap<String, ListedFile>,
}

/// One page of results plus the counters the widget's UI displays.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub files: Vec<ListedFile>,
    pub is_end: bool,
    /// Files surviving whitelist and blacklist, before the filter glob.
    pub count_total: usize,
    /// Files surviving the filter glob as well.
    pub count_filtered: usize,
}

pub struct DirectoryQueryEngine {
    files: Arc<dyn SourceFileStore>,
    previews: Arc<PreviewCache>,
    default_max_files: usize,
}

impl DirectoryQueryEngine {
    pub fn new(
        files: Arc<dyn SourceFileStore>,
        previews: Arc<PreviewCache>,
        default_max_files: usize,
    ) -> Self {
        Self {
            files,
            previews,
            default_max_files,
        }
    }

    pub fn list(&self, req: &ListRequest) -> CoreResult<ListPage> {
        let dir = path::clean_path(&req.dir)?;
        let max_files = req.max_files.unwrap_or(self.default_max_files).max(1);

        let whitelist = build_globs(&req.whitelist, true)?;
        let blacklist = build_globs(&req.blacklist, true)?;
        let filter = if req.filter.is_empty() {
            None
        } else {
            build_globs(std::slice::from_ref(&req.filter), false)?
        };

        let entries = self.files.list(&dir)?;

        // Split the scan into owners and format variants. A variant is an
        // image whose stem ends with a recognized suffix; it is indexed
        // under the owner name it derives from and never emitted as a
        // top-level row.
        let mut owners: Vec<SourceEntry> = Vec::new();
        let mut variants: HashMap<&str, HashMap<String, SourceEntry>> = HashMap::new();
        'entries: for entry in entries {
            if entry.is_dir {
                continue;
            }
            if media::is_image(&entry.name) {
                for (id, suffix) in req.format_ids.iter().zip(&req.format_suffixes) {
                    let stem = path::stem(&entry.name);
                    if !suffix.is_empty()
                        && stem.len() > suffix.len()
                        && stem.ends_with(suffix.as_str())
                    {
                        let owner_stem = &stem[..stem.len() - suffix.len()];
                        let owner_name = match path::ext(&entry.name) {
                            Some(ext) => format!("{owner_stem}.{ext}"),
                            None => owner_stem.to_string(),
                        };
                        variants
                            .entry(id.as_str())
                            .or_default()
                            .insert(owner_name, entry);
                        continue 'entries;
                    }
                }
            }
            owners.push(entry);
        }

        if let Some(set) = &whitelist {
            owners.retain(|e| set.is_match(&e.name));
        }
        if let Some(set) = &blacklist {
            owners.retain(|e| !set.is_match(&e.name));
        }
        let count_total = owners.len();

        if let Some(set) = &filter {
            owners.retain(|e| set.is_match(&e.name));
        }
        let count_filtered = owners.len();

        // Owners removed by any of the filters take their variants along.
        for per_owner in variants.values_mut() {
            per_owner.retain(|owner_name, _| owners.iter().any(|e| &e.name == owner_name));
        }

        owners.sort_by(|a, b| {
            let ord = compare_entries(a, b, req.order_by);
            if req.ascending {
                ord
            } else {
                ord.reverse()
            }
        });

        let start = match (&req.last_file, req.last_index) {
            (Some(last), _) => owners
                .iter()
                .position(|e| &e.name == last)
                .map(|i| i + 1)
                .unwrap_or(0),
            (None, Some(index)) => index + 1,
            (None, None) => 0,
        };
        let is_end = start + max_files >= owners.len();

        // Forced names are pulled out and re-inserted at the front of the
        // page, in the order the request lists them, but only when slicing
        // actually happens. They never shift the cursor arithmetic above.
        let needs_slice = start > 0 || owners.len() > max_files;
        let page: Vec<SourceEntry> = if needs_slice {
            let mut pulled = Vec::new();
            let mut rest = Vec::new();
            for entry in owners {
                if req.always_include.iter().any(|n| n == &entry.name) {
                    pulled.push(entry);
                } else {
                    rest.push(entry);
                }
            }
            let mut forced = Vec::new();
            for name in &req.always_include {
                if let Some(at) = pulled.iter().position(|e| &e.name == name) {
                    forced.push(pulled.remove(at));
                }
            }
            let end = (start + max_files).min(rest.len());
            let slice = if start < rest.len() {
                rest[start..end].to_vec()
            } else {
                Vec::new()
            };
            forced.into_iter().chain(slice).collect()
        } else {
            owners
        };

        let files: Vec<ListedFile> = page
            .par_iter()
            .map(|entry| {
                let mut row = self.build_entry(&dir, entry);
                for (id, per_owner) in &variants {
                    if let Some(variant) = per_owner.get(&entry.name) {
                        row.formats
                            .insert(id.to_string(), self.build_entry(&dir, variant));
                    }
                }
                row
            })
            .collect();

        Ok(ListPage {
            files,
            is_end,
            count_total,
            count_filtered,
        })
    }

    /// Builds a row from the preview sidecar, falling back to the stat the
    /// scan already produced if the sidecar cannot be read.
    fn build_entry(&self, dir: &str, entry: &SourceEntry) -> ListedFile {
        let full = path::join(dir, &entry.name);
        match self.previews.get_info(&full) {
            Ok(info) => ListedFile {
                name: entry.name.clone(),
                size: info.size,
                timestamp: info.mtime,
                width: info.width,
                height: info.height,
                blur_hash: info.blur_hash,
                formats: BTreeMap::new(),
            },
            Err(e) => {
                tracing::warn!(path = %full, error = %e, "sidecar unavailable, using scan stat");
                ListedFile {
                    name: entry.name.clone(),
                    size: entry.size,
                    timestamp: entry.mtime,
                    width: None,
                    height: None,
                    blur_hash: None,
                    formats: BTreeMap::new(),
                }
            }
        }
    }
}

fn build_globs(patterns: &[String], case_insensitive: bool) -> CoreResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| CoreError::InvalidPath(format!("bad glob {pattern:?}: {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| CoreError::InvalidPath(e.to_string()))?;
    Ok(Some(set))
}

/// Composite comparison. The primary field is followed by the other two
/// as tie-breaks in a fixed priority per [`OrderBy`].
fn compare_entries(a: &SourceEntry, b: &SourceEntry, order_by: OrderBy) -> Ordering {
    let by_name = || natural_cmp(&a.name, &b.name);
    let by_date = || a.mtime.cmp(&b.mtime);
    let by_size = || a.size.cmp(&b.size);
    match order_by {
        OrderBy::Date => by_date().then_with(by_name).then_with(by_size),
        OrderBy::Size => by_size().then_with(by_name).then_with(by_date),
        OrderBy::Name => by_name().then_with(by_date).then_with(by_size),
    }
}

/// Natural string order: runs of ASCII digits compare by numeric value,
/// everything else byte by byte ignoring ASCII case. `img2` sorts before
/// `img10`. Strings equal under folding fall back to exact byte order so
/// the sort stays total and deterministic.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let run_a = digit_run(a, i);
            let run_b = digit_run(b, j);
            let num_a = strip_zeros(&a[i..run_a]);
            let num_b = strip_zeros(&b[j..run_b]);
            let ord = num_a
                .len()
                .cmp(&num_b.len())
                .then_with(|| num_a.cmp(num_b));
            if ord != Ordering::Equal {
                return ord;
            }
            i = run_a;
            j = run_b;
        } else {
            let ord = a[i]
                .to_ascii_lowercase()
                .cmp(&b[j].to_ascii_lowercase());
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i)
        .cmp(&(b.len() - j))
        .then_with(|| a.cmp(b))
}

fn digit_run(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    idx
}

fn strip_zeros(digits: &[u8]) -> &[u8] {
    let nonzero = digits.iter().position(|&b| b != b'0');
    match nonzero {
        Some(at) => &digits[at..],
        None => &digits[digits.len().saturating_sub(1)..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::PreviewOptions;
    use crate::store::{LocalCacheStore, LocalSourceStore};
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        engine: DirectoryQueryEngine,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("files")).unwrap();
        let files = Arc::new(LocalSourceStore::new(tmp.path().join("files")));
        let cache = Arc::new(LocalCacheStore::new(tmp.path().join("cache")));
        let previews = Arc::new(PreviewCache::new(
            files.clone(),
            cache,
            PreviewOptions::default(),
        ));
        let engine = DirectoryQueryEngine::new(files, previews, 100);
        Fixture { tmp, engine }
    }

    /// Writes a file and pins its mtime to `base + offset_secs`.
    fn write_file(f: &Fixture, name: &str, bytes: &[u8], offset_secs: u64) {
        let path = f.tmp.path().join("files").join(name);
        fs::write(&path, bytes).unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(base + Duration::from_secs(offset_secs))
            .unwrap();
    }

    fn names(page: &ListPage) -> Vec<&str> {
        page.files.iter().map(|f| f.name.as_str()).collect()
    }

    fn request(dir: &str) -> ListRequest {
        ListRequest {
            dir: dir.to_string(),
            ..ListRequest::default()
        }
    }

    #[test]
    fn lists_files_sorted_by_name() {
        let f = fixture();
        write_file(&f, "b.txt", b"bb", 0);
        write_file(&f, "a.txt", b"a", 1);
        write_file(&f, "c.txt", b"ccc", 2);

        let mut req = request("/");
        req.ascending = true;
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["a.txt", "b.txt", "c.txt"]);
        assert!(page.is_end);
        assert_eq!(page.count_total, 3);
        assert_eq!(page.count_filtered, 3);
    }

    #[test]
    fn natural_order_sorts_numeric_runs() {
        assert_eq!(natural_cmp("img2.png", "img10.png"), Ordering::Less);
        assert_eq!(natural_cmp("img10.png", "img10.png"), Ordering::Equal);
        assert_eq!(natural_cmp("a10", "a9"), Ordering::Greater);
        // Runs compare numerically equal; the byte tiebreak keeps the
        // order total, with the zero-padded form first.
        assert_eq!(natural_cmp("a002", "a2"), Ordering::Less);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
        assert_eq!(natural_cmp("file", "img"), Ordering::Less);
        // ASCII case is ignored, with exact bytes as the final tiebreak.
        assert_eq!(natural_cmp("B.txt", "a.txt"), Ordering::Greater);
        assert_eq!(natural_cmp("A.txt", "a.txt"), Ordering::Less);
    }

    #[test]
    fn directories_are_not_listed_as_files() {
        let f = fixture();
        write_file(&f, "a.txt", b"a", 0);
        fs::create_dir(f.tmp.path().join("files").join("sub")).unwrap();

        let page = f.engine.list(&request("/")).unwrap();
        assert_eq!(names(&page), vec!["a.txt"]);
    }

    #[test]
    fn missing_directory_fails() {
        let f = fixture();
        assert!(matches!(
            f.engine.list(&request("/nope")),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn whitelist_is_case_insensitive() {
        let f = fixture();
        write_file(&f, "Photo.JPG", b"x", 0);
        write_file(&f, "notes.txt", b"x", 1);

        let mut req = request("/");
        req.whitelist = vec!["*.jpg".to_string()];
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["Photo.JPG"]);
        assert_eq!(page.count_total, 1);
    }

    #[test]
    fn blacklist_removes_matches() {
        let f = fixture();
        write_file(&f, "keep.txt", b"x", 0);
        write_file(&f, "drop.tmp", b"x", 1);

        let mut req = request("/");
        req.blacklist = vec!["*.TMP".to_string()];
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["keep.txt"]);
    }

    #[test]
    fn filter_glob_is_case_sensitive_and_counts_separately() {
        let f = fixture();
        write_file(&f, "a.txt", b"x", 0);
        write_file(&f, "A.TXT", b"x", 1);
        write_file(&f, "b.log", b"x", 2);

        let mut req = request("/");
        req.filter = "*.txt".to_string();
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["a.txt"]);
        assert_eq!(page.count_total, 3);
        assert_eq!(page.count_filtered, 1);
    }

    #[test]
    fn bad_glob_is_rejected() {
        let f = fixture();
        write_file(&f, "a.txt", b"x", 0);

        let mut req = request("/");
        req.whitelist = vec!["[".to_string()];
        assert!(matches!(
            f.engine.list(&req),
            Err(CoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn variant_attaches_under_owner_and_never_tops() {
        let f = fixture();
        write_file(&f, "foo.jpg", b"owner", 0);
        write_file(&f, "foo-small.jpg", b"thumb", 1);

        let mut req = request("/");
        req.format_ids = vec!["small".to_string()];
        req.format_suffixes = vec!["-small".to_string()];
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["foo.jpg"]);
        let owner = &page.files[0];
        let variant = owner.formats.get("small").unwrap();
        assert_eq!(variant.name, "foo-small.jpg");
        assert!(variant.formats.is_empty());
    }

    #[test]
    fn variant_suffix_on_non_image_stays_top_level() {
        let f = fixture();
        write_file(&f, "report-small.txt", b"x", 0);

        let mut req = request("/");
        req.format_ids = vec!["small".to_string()];
        req.format_suffixes = vec!["-small".to_string()];
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["report-small.txt"]);
    }

    #[test]
    fn removed_owner_takes_its_variant_along() {
        let f = fixture();
        write_file(&f, "foo.jpg", b"owner", 0);
        write_file(&f, "foo-small.jpg", b"thumb", 1);
        write_file(&f, "bar.png", b"x", 2);

        let mut req = request("/");
        req.format_ids = vec!["small".to_string()];
        req.format_suffixes = vec!["-small".to_string()];
        req.blacklist = vec!["foo.jpg".to_string()];
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["bar.png"]);
        assert!(page.files[0].formats.is_empty());
    }

    #[test]
    fn date_descending_two_page_walk() {
        let f = fixture();
        write_file(&f, "a.jpg", b"aaaa", 10);
        write_file(&f, "a-small.jpg", b"aa", 20);
        write_file(&f, "b.png", b"bbb", 30);

        let mut req = request("/");
        req.order_by = OrderBy::Date;
        req.ascending = false;
        req.max_files = Some(1);
        req.format_ids = vec!["small".to_string()];
        req.format_suffixes = vec!["-small".to_string()];

        let first = f.engine.list(&req).unwrap();
        assert_eq!(names(&first), vec!["b.png"]);
        assert!(!first.is_end);

        req.last_file = Some("b.png".to_string());
        let second = f.engine.list(&req).unwrap();
        assert_eq!(names(&second), vec!["a.jpg"]);
        assert!(second.is_end);
        assert!(second.files[0].formats.contains_key("small"));
    }

    #[test]
    fn pagination_covers_everything_without_duplicates() {
        let f = fixture();
        for i in 0..7 {
            write_file(&f, &format!("file{i}.txt"), b"x", i);
        }

        let mut req = request("/");
        req.ascending = true;
        req.max_files = Some(3);

        let mut seen = Vec::new();
        loop {
            let page = f.engine.list(&req).unwrap();
            seen.extend(page.files.iter().map(|e| e.name.clone()));
            if page.is_end {
                break;
            }
            req.last_file = Some(page.files.last().unwrap().name.clone());
        }

        let expected: Vec<String> = (0..7).map(|i| format!("file{i}.txt")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn last_index_cursor_resumes_after_position() {
        let f = fixture();
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            write_file(&f, name, b"x", 0);
        }

        let mut req = request("/");
        req.ascending = true;
        req.max_files = Some(2);
        req.last_index = Some(1);
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["c.txt", "d.txt"]);
        assert!(page.is_end);
    }

    #[test]
    fn last_file_takes_priority_over_last_index() {
        let f = fixture();
        for name in ["a.txt", "b.txt", "c.txt"] {
            write_file(&f, name, b"x", 0);
        }

        let mut req = request("/");
        req.ascending = true;
        req.max_files = Some(1);
        req.last_file = Some("a.txt".to_string());
        req.last_index = Some(2);
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["b.txt"]);
    }

    #[test]
    fn always_include_is_forced_onto_sliced_pages() {
        let f = fixture();
        for name in ["a.txt", "b.txt", "c.txt", "z.txt"] {
            write_file(&f, name, b"x", 0);
        }

        let mut req = request("/");
        req.ascending = true;
        req.max_files = Some(2);
        req.always_include = vec!["z.txt".to_string()];
        let page = f.engine.list(&req).unwrap();

        // z.txt sorts last but is forced to the front of the page.
        assert_eq!(names(&page), vec!["z.txt", "a.txt", "b.txt"]);
        assert!(!page.is_end);
    }

    #[test]
    fn always_include_keeps_request_order_not_sort_order() {
        let f = fixture();
        for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
            write_file(&f, name, b"x", 0);
        }

        let mut req = request("/");
        req.ascending = true;
        req.max_files = Some(2);
        req.always_include = vec!["d.txt".to_string(), "b.txt".to_string()];
        let page = f.engine.list(&req).unwrap();

        // d.txt sorts after b.txt but the request lists it first.
        assert_eq!(names(&page), vec!["d.txt", "b.txt", "a.txt", "c.txt"]);
        assert!(!page.is_end);
    }

    #[test]
    fn always_include_leaves_unsliced_pages_alone() {
        let f = fixture();
        write_file(&f, "a.txt", b"x", 0);
        write_file(&f, "z.txt", b"x", 1);

        let mut req = request("/");
        req.ascending = true;
        req.always_include = vec!["z.txt".to_string()];
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["a.txt", "z.txt"]);
    }

    #[test]
    fn size_order_breaks_ties_by_name() {
        let f = fixture();
        write_file(&f, "b.txt", b"xx", 0);
        write_file(&f, "a.txt", b"xx", 1);
        write_file(&f, "big.txt", b"xxxxx", 2);

        let mut req = request("/");
        req.order_by = OrderBy::Size;
        req.ascending = true;
        let page = f.engine.list(&req).unwrap();

        assert_eq!(names(&page), vec!["a.txt", "b.txt", "big.txt"]);
    }

    #[test]
    fn rows_serialize_in_camel_case() {
        let row = ListedFile {
            name: "a.jpg".to_string(),
            size: 4,
            timestamp: 99,
            width: Some(10),
            height: None,
            blur_hash: Some("LEHV6".to_string()),
            formats: BTreeMap::new(),
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"blurHash\":\"LEHV6\""));
        assert!(json.contains("\"timestamp\":99"));
        assert!(!json.contains("height"));
        assert!(!json.contains("formats"));
    }
}
