//! Image preview generation and caching.
//!
//! [`generate::generate`] turns bytes into pixels; [`cache::PreviewCache`]
//! decides when that work can be skipped.

pub mod cache;
pub mod generate;

pub use cache::{Preview, PreviewCache, PreviewOptions, PreviewPayload};
pub use generate::{generate, FitMode, RenderedPreview};

use serde::{Deserialize, Serialize};

use crate::store::SourceStat;

/// Sidecar metadata stored next to a source file's cached previews.
///
/// `width`/`height`/`blurHash` are populated lazily: computing them means
/// decoding the image, so they only appear once a preview has actually
/// been rendered. Metadata-only consumers (directory listings) must
/// tolerate their absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    /// Source mtime (seconds since epoch) at the time the sidecar was written.
    pub mtime: i64,
    /// Source size in bytes at the time the sidecar was written.
    pub size: u64,
    /// Source image width, known after the first render.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Source image height, known after the first render.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Perceptual placeholder hash of the rendered preview.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
}

impl CacheInfo {
    /// A sidecar carrying only the identity snapshot, no render results.
    pub fn stub(stat: SourceStat) -> Self {
        Self {
            mtime: stat.mtime,
            size: stat.size,
            width: None,
            height: None,
            blur_hash: None,
        }
    }

    /// Returns `true` while the sidecar still describes the live file.
    pub fn matches(&self, stat: SourceStat) -> bool {
        self.mtime == stat.mtime && self.size == stat.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_has_no_render_fields() {
        let info = CacheInfo::stub(SourceStat { size: 10, mtime: 99 });
        assert_eq!(info.size, 10);
        assert_eq!(info.mtime, 99);
        assert!(info.width.is_none());
        assert!(info.height.is_none());
        assert!(info.blur_hash.is_none());
    }

    #[test]
    fn matches_compares_both_fields() {
        let info = CacheInfo::stub(SourceStat { size: 10, mtime: 99 });
        assert!(info.matches(SourceStat { size: 10, mtime: 99 }));
        assert!(!info.matches(SourceStat { size: 11, mtime: 99 }));
        assert!(!info.matches(SourceStat { size: 10, mtime: 98 }));
    }

    #[test]
    fn sidecar_json_uses_camel_case_and_omits_absent_fields() {
        let stub = CacheInfo::stub(SourceStat { size: 5, mtime: 7 });
        let json = serde_json::to_string(&stub).unwrap();
        assert_eq!(json, r#"{"mtime":7,"size":5}"#);

        let full = CacheInfo {
            width: Some(640),
            height: Some(480),
            blur_hash: Some("LEHV6nWB2yk8".to_string()),
            ..stub
        };
        let json = serde_json::to_string(&full).unwrap();
        assert!(json.contains(r#""blurHash":"LEHV6nWB2yk8""#));
        assert!(json.contains(r#""width":640"#));
    }

    #[test]
    fn sidecar_json_round_trip() {
        let info = CacheInfo {
            mtime: 1,
            size: 2,
            width: Some(3),
            height: Some(4),
            blur_hash: Some("hash".to_string()),
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: CacheInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
