//! WebFM core library — server-side logic for a browser file-manager widget.
//!
//! `webfm-core` implements the two stateful parts of the system: the image
//! preview cache and the paginated directory-listing query engine. It is
//! intentionally decoupled from any HTTP framework so that request routing
//! and response envelopes can live in a thin frontend crate.
//!
//! # Modules
//!
//! - [`store`] — Storage abstractions: [`SourceFileStore`], [`CacheStore`], local-disk implementations.
//! - [`preview`] — Preview generation ([`preview::generate`]) and the fingerprinted cache ([`PreviewCache`]).
//! - [`listing`] — Filtered, sorted, cursor-paginated directory listing ([`DirectoryQueryEngine`]).
//! - [`ops`] — Delete/rename/move/copy pass-throughs with cache bookkeeping ([`FileOps`]).
//! - [`config`] — TOML configuration and [`config::Core`] assembly.
//! - [`error`] — Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod config;
pub mod error;
pub mod listing;
pub mod media;
pub mod ops;
pub mod path;
pub mod preview;
pub mod store;

pub use config::{Config, Core};
pub use error::{CoreError, CoreResult};
pub use listing::{DirectoryQueryEngine, ListPage, ListRequest, ListedFile, OrderBy};
pub use ops::FileOps;
pub use preview::{
    CacheInfo, FitMode, Preview, PreviewCache, PreviewOptions, PreviewPayload,
};
pub use store::{CacheStore, SourceEntry, SourceFileStore, SourceStat};

/// Normalises a string to NFC (composed) form.
///
/// macOS clients upload filenames in NFD (decomposed) form; cache keys and
/// sort order must not depend on which client wrote the file, so names are
/// re-composed at the storage boundary.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nfc_string_composes_decomposed_hangul() {
        let decomposed = "\u{1112}\u{1161}\u{11ab}"; // 한 as Jamo
        assert_eq!(nfc_string(decomposed), "\u{d55c}");
    }

    #[test]
    fn nfc_string_leaves_ascii_untouched() {
        assert_eq!(nfc_string("photo-small.jpg"), "photo-small.jpg");
    }
}
