//! Extension-based media type helpers.

use crate::path;

/// Image file extensions recognised by [`is_image`].
const IMAGE_EXTENSIONS: &[&str] = &["gif", "jpg", "jpeg", "png", "bmp", "webp", "svg"];

/// Returns `true` if the file name has a recognised image extension.
pub fn is_image(name: &str) -> bool {
    path::ext(name)
        .map(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Returns `true` if the file name has an `.svg` extension.
///
/// SVG is special throughout the crate: it is never rasterized, so "the
/// preview" of an SVG is the source file itself.
pub fn is_svg(name: &str) -> bool {
    path::ext(name).as_deref() == Some("svg")
}

/// Looks up the image mime type for a file name, by extension.
///
/// Returns `None` for anything that is not a recognised image.
pub fn image_mime_type(name: &str) -> Option<&'static str> {
    match path::ext(name)?.as_str() {
        "gif" => Some("image/gif"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_image_extensions() {
        assert!(is_image("photo.jpg"));
        assert!(is_image("photo.JPEG"));
        assert!(is_image("anim.gif"));
        assert!(is_image("pic.webp"));
        assert!(is_image("logo.svg"));
        assert!(!is_image("doc.pdf"));
        assert!(!is_image("noext"));
    }

    #[test]
    fn svg_detection() {
        assert!(is_svg("logo.svg"));
        assert!(is_svg("logo.SVG"));
        assert!(!is_svg("logo.png"));
    }

    #[test]
    fn mime_types() {
        assert_eq!(image_mime_type("a.jpg"), Some("image/jpeg"));
        assert_eq!(image_mime_type("a.jpeg"), Some("image/jpeg"));
        assert_eq!(image_mime_type("a.png"), Some("image/png"));
        assert_eq!(image_mime_type("a.svg"), Some("image/svg+xml"));
        assert_eq!(image_mime_type("a.txt"), None);
        assert_eq!(image_mime_type("a"), None);
    }
}
