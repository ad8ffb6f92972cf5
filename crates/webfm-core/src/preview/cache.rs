//! The preview cache: fingerprinted artifacts with JSON sidecars.
//!
//! Every source file maps to one sidecar (`/previews<path>.json`) plus one
//! artifact per requested box. The artifact name embeds the requested box
//! and a digest of `(path, size, mtime, box)`, so the key changes exactly
//! when the rendered output would change; a reader can never hit a stale
//! artifact, even with several box sizes cached side by side.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::media;
use crate::path;
use crate::preview::generate::{self, FitMode};
use crate::preview::CacheInfo;
use crate::store::{CacheStore, SourceFileStore, SourceStat};

/// Reserved segment of the cache tree that holds previews.
const PREVIEWS_ROOT: &str = "/previews";

/// Number of stripes in the per-fingerprint lock table.
const LOCK_STRIPES: usize = 32;

/// Component grid for the placeholder hash, matching the widget's decoder.
const BLURHASH_COMPONENTS: (u32, u32) = (4, 3);

/// Rendering parameters for the default preview box.
#[derive(Debug, Clone, Copy)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub fit_mode: FitMode,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 159,
            height: 139,
            fit_mode: FitMode::ContainPad,
        }
    }
}

/// Where the bytes of a preview live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewPayload {
    /// A key in the cache store.
    Cached(String),
    /// A path in the source store. Used for SVG, which is served verbatim.
    Original(String),
}

/// A resolved preview: mime type plus a handle to the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub mime: &'static str,
    pub payload: PreviewPayload,
}

/// Derived cache key: everything that affects the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    path: String,
    size: u64,
    mtime: i64,
    width: Option<u32>,
    height: Option<u32>,
}

impl Fingerprint {
    fn new(path: &str, stat: SourceStat, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            path: path.to_string(),
            size: stat.size,
            mtime: stat.mtime,
            width,
            height,
        }
    }

    fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.path.as_bytes());
        hasher.update([0]);
        hasher.update(self.size.to_le_bytes());
        hasher.update(self.mtime.to_le_bytes());
        hasher.update(self.width.unwrap_or(0).to_le_bytes());
        hasher.update(self.height.unwrap_or(0).to_le_bytes());
        hasher.finalize().into()
    }

    /// Cache key of the rendered artifact for this fingerprint.
    fn artifact_key(&self) -> String {
        let digest = self.digest();
        let mut short = String::with_capacity(16);
        for byte in &digest[..8] {
            short.push_str(&format!("{byte:02x}"));
        }
        format!(
            "{PREVIEWS_ROOT}{}.{}x{}-{short}.png",
            self.path,
            box_label(self.width),
            box_label(self.height),
        )
    }
}

/// Stripe index for a source path. All sidecar writers for one path share
/// a stripe, so a stub written by `get_info` can never interleave with a
/// render's full sidecar for the same file.
fn stripe_of(path: &str) -> usize {
    let digest = Sha256::digest(path.as_bytes());
    digest[0] as usize % LOCK_STRIPES
}

fn box_label(side: Option<u32>) -> String {
    match side {
        Some(px) => px.to_string(),
        None => "auto".to_string(),
    }
}

/// Cache key of a source file's metadata sidecar.
fn info_key(path: &str) -> String {
    format!("{PREVIEWS_ROOT}{path}.json")
}

/// Orchestrates the cache store and the preview generator.
///
/// Cache population is at-most-one-concurrent-generation-per-fingerprint:
/// callers racing on the same source path serialize on a striped lock and
/// all observe the artifact the first one produced, while distinct paths
/// proceed fully in parallel. Sidecar writes (stubs included) happen only
/// under that lock, so a metadata-only call can never clobber the full
/// sidecar a concurrent render just wrote.
pub struct PreviewCache {
    files: Arc<dyn SourceFileStore>,
    cache: Arc<dyn CacheStore>,
    options: PreviewOptions,
    locks: [Mutex<()>; LOCK_STRIPES],
    /// In-memory sidecar memo, validated against the live stat on every
    /// read and dropped on invalidation.
    infos: RwLock<HashMap<String, CacheInfo>>,
}

impl PreviewCache {
    pub fn new(
        files: Arc<dyn SourceFileStore>,
        cache: Arc<dyn CacheStore>,
        options: PreviewOptions,
    ) -> Self {
        Self {
            files,
            cache,
            options,
            locks: std::array::from_fn(|_| Mutex::new(())),
            infos: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the sidecar metadata for `path` without ever rendering.
    ///
    /// A missing sidecar is replaced by a freshly written stub carrying
    /// only `(mtime, size)`; so is a sidecar that no longer matches the
    /// live file, which keeps listing columns truthful after an edit.
    pub fn get_info(&self, source_path: &str) -> CoreResult<CacheInfo> {
        let source_path = path::clean_path(source_path)?;
        let stat = self.files.stat(&source_path)?;

        if let Some(info) = self.infos.read().get(&source_path) {
            if info.matches(stat) {
                return Ok(info.clone());
            }
        }

        // The absence check and the stub write must not interleave with a
        // concurrent render's sidecar write for the same path.
        let _guard = self.locks[stripe_of(&source_path)].lock();

        if let Some(info) = self.load_sidecar(&source_path) {
            if info.matches(stat) {
                self.infos
                    .write()
                    .insert(source_path.clone(), info.clone());
                return Ok(info);
            }
        }

        let stub = CacheInfo::stub(stat);
        self.write_sidecar(&source_path, &stub)?;
        Ok(stub)
    }

    /// Returns a preview rendered into the configured default box.
    pub fn get_preview(&self, source_path: &str) -> CoreResult<Preview> {
        self.get_preview_sized(
            source_path,
            Some(self.options.width),
            Some(self.options.height),
        )
    }

    /// Returns a preview rendered into the requested box, generating and
    /// caching it if no valid artifact exists yet.
    ///
    /// At most one of `width`/`height` may be `None` (derived from the
    /// source aspect ratio). SVG bypasses the cache entirely: the preview
    /// of an SVG is the original file.
    pub fn get_preview_sized(
        &self,
        source_path: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> CoreResult<Preview> {
        let source_path = path::clean_path(source_path)?;
        let stat = self.files.stat(&source_path)?;

        if media::is_svg(path::file_name(&source_path)) {
            return Ok(Preview {
                mime: "image/svg+xml",
                payload: PreviewPayload::Original(source_path),
            });
        }

        let fingerprint = Fingerprint::new(&source_path, stat, width, height);
        let _guard = self.locks[stripe_of(&source_path)].lock();

        let artifact_key = fingerprint.artifact_key();
        let sidecar = self.load_sidecar(&source_path);

        let sidecar_valid = sidecar.as_ref().map(|i| i.matches(stat)).unwrap_or(false);
        if sidecar_valid && self.cache.exists(&artifact_key) {
            return Ok(Preview {
                mime: "image/png",
                payload: PreviewPayload::Cached(artifact_key),
            });
        }

        // Drop whatever the previous generation left behind: the artifact
        // under the superseded fingerprint (reconstructed from the old
        // sidecar stat) and anything half-present under the current one.
        if let Some(old) = &sidecar {
            if !old.matches(stat) {
                let old_stat = SourceStat {
                    size: old.size,
                    mtime: old.mtime,
                };
                let old_key =
                    Fingerprint::new(&source_path, old_stat, width, height).artifact_key();
                self.cache.delete(&old_key)?;
            }
        }
        self.cache.delete(&artifact_key)?;

        tracing::debug!(path = %source_path, key = %artifact_key, "rendering preview");

        let bytes = self.files.read(&source_path)?;
        let rendered =
            generate::generate(&bytes, width, height, self.options.fit_mode)?;

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(rendered.image.clone())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| CoreError::ImageProcess(e.to_string()))?;
        self.cache.put(&artifact_key, &png)?;

        let info = CacheInfo {
            mtime: stat.mtime,
            size: stat.size,
            width: Some(rendered.source_width),
            height: Some(rendered.source_height),
            blur_hash: placeholder_hash(&rendered.image),
        };
        self.write_sidecar(&source_path, &info)?;

        Ok(Preview {
            mime: "image/png",
            payload: PreviewPayload::Cached(artifact_key),
        })
    }

    /// Drops every cached trace of `path`: the in-memory memo, the
    /// default-box artifact, and the sidecar.
    ///
    /// Artifacts for non-default boxes become unreachable garbage (their
    /// keys embed the vanished stat) and are swept opportunistically on
    /// the next regeneration.
    pub fn invalidate(&self, source_path: &str) -> CoreResult<()> {
        let source_path = path::clean_path(source_path)?;
        let _guard = self.locks[stripe_of(&source_path)].lock();
        self.infos.write().remove(&source_path);

        let boxes = (Some(self.options.width), Some(self.options.height));
        if let Some(old) = self.load_sidecar(&source_path) {
            let old_stat = SourceStat {
                size: old.size,
                mtime: old.mtime,
            };
            let key = Fingerprint::new(&source_path, old_stat, boxes.0, boxes.1).artifact_key();
            self.cache.delete(&key)?;
        }
        if let Ok(stat) = self.files.stat(&source_path) {
            let key = Fingerprint::new(&source_path, stat, boxes.0, boxes.1).artifact_key();
            self.cache.delete(&key)?;
        }
        self.cache.delete(&info_key(&source_path))?;
        Ok(())
    }

    /// Reads the bytes behind a resolved [`Preview`].
    pub fn load_bytes(&self, preview: &Preview) -> CoreResult<Vec<u8>> {
        match &preview.payload {
            PreviewPayload::Cached(key) => self.cache.get(key),
            PreviewPayload::Original(path) => self.files.read(path),
        }
    }

    fn load_sidecar(&self, source_path: &str) -> Option<CacheInfo> {
        let key = info_key(source_path);
        if !self.cache.exists(&key) {
            return None;
        }
        let bytes = self.cache.get(&key).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "unparsable preview sidecar, discarding");
                None
            }
        }
    }

    fn write_sidecar(&self, source_path: &str, info: &CacheInfo) -> CoreResult<()> {
        let key = info_key(source_path);
        let bytes = serde_json::to_vec(info)
            .map_err(|_| CoreError::CacheWrite(std::path::PathBuf::from(&key)))?;
        self.cache.put(&key, &bytes)?;
        self.infos
            .write()
            .insert(source_path.to_string(), info.clone());
        Ok(())
    }
}

/// Encodes the rendered preview's pixels into a BlurHash placeholder.
///
/// Hashing the thumbnail, not the original, bounds the cost regardless of
/// source resolution. Failure degrades to `None`; a missing placeholder
/// must never fail the preview itself.
fn placeholder_hash(image: &image::RgbaImage) -> Option<String> {
    let (cx, cy) = BLURHASH_COMPONENTS;
    match blurhash::encode(cx, cy, image.width(), image.height(), image.as_raw()) {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::warn!(error = ?e, "blurhash computation failed, omitting placeholder");
            None
        }
    }
}
