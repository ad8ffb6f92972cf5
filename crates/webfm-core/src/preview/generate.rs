//! Preview rendering: decode, orient, resize, composite.
//!
//! [`generate`] is a pure function over image bytes; all I/O belongs to
//! the caller. SVG never reaches this module, callers pass the original
//! file through unchanged instead.

use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgba, RgbaImage};

use crate::error::{CoreError, CoreResult};

/// Side length of one checkerboard cell, in pixels.
const CHECKER_SIZE: u32 = 20;

/// The two near-white grays the checkerboard alternates between.
const CHECKER_LIGHT: Rgba<u8> = Rgba([250, 250, 250, 255]);
const CHECKER_DARK: Rgba<u8> = Rgba([240, 240, 240, 255]);

/// How a source image is mapped onto the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum FitMode {
    /// Scale to fit entirely inside the box, pad the rest with the
    /// checkerboard. The box is the output canvas.
    #[default]
    #[serde(rename = "contain")]
    ContainPad,
    /// Scale to cover the whole box, center-crop the overflow.
    #[serde(rename = "cover")]
    CoverCrop,
}

/// A rendered preview plus the source dimensions it was derived from.
#[derive(Debug, Clone)]
pub struct RenderedPreview {
    /// The composited preview canvas.
    pub image: RgbaImage,
    /// Width of the decoded source after orientation correction.
    pub source_width: u32,
    /// Height of the decoded source after orientation correction.
    pub source_height: u32,
}

/// Decodes `bytes` and renders a preview into the requested box.
///
/// At most one of `target_w` / `target_h` may be `None`; the missing side
/// is derived from the source aspect ratio. When both are `None` the
/// canvas keeps the source dimensions.
///
/// # Errors
///
/// Returns [`CoreError::ImageProcess`] when the bytes cannot be decoded
/// by any supported decoder, or when the decoded image is degenerate.
pub fn generate(
    bytes: &[u8],
    target_w: Option<u32>,
    target_h: Option<u32>,
    fit: FitMode,
) -> CoreResult<RenderedPreview> {
    let decoded = decode(bytes)?;

    let (ow, oh) = (decoded.width(), decoded.height());
    if ow == 0 || oh == 0 {
        return Err(CoreError::ImageProcess("image has zero dimension".into()));
    }

    let (pw, ph) = resolve_box(ow, oh, target_w, target_h);
    let image = match fit {
        FitMode::ContainPad => contain_pad(&decoded, pw, ph),
        FitMode::CoverCrop => cover_crop(&decoded, pw, ph),
    };

    Ok(RenderedPreview {
        image,
        source_width: ow,
        source_height: oh,
    })
}

/// Decodes image bytes, applying EXIF orientation correction.
///
/// The format-native decoder (chosen by magic-byte sniffing) is tried
/// first; if it rejects the bytes, the remaining decoders are probed in
/// turn. Some encoders in the wild produce non-conformant JPEGs that only
/// a second pass reads.
fn decode(bytes: &[u8]) -> CoreResult<DynamicImage> {
    let sniffed = image::guess_format(bytes).ok();

    if let Some(format) = sniffed {
        if let Ok(img) = decode_as(bytes, format) {
            return Ok(img);
        }
    }

    let fallbacks = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::WebP,
        ImageFormat::Bmp,
    ];
    for format in fallbacks {
        if Some(format) == sniffed {
            continue;
        }
        if let Ok(img) = decode_as(bytes, format) {
            return Ok(img);
        }
    }

    Err(CoreError::ImageProcess(
        "unsupported or corrupt image data".into(),
    ))
}

fn decode_as(bytes: &[u8], format: ImageFormat) -> CoreResult<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(format);
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| CoreError::ImageProcess(e.to_string()))?;
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| CoreError::ImageProcess(e.to_string()))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Resolves the output box from the request, deriving an unset side from
/// the source aspect ratio (floor, never below 1 px).
fn resolve_box(ow: u32, oh: u32, target_w: Option<u32>, target_h: Option<u32>) -> (u32, u32) {
    let ratio = ow as f64 / oh as f64;
    match (target_w, target_h) {
        (Some(w), Some(h)) => (w.max(1), h.max(1)),
        (Some(w), None) => {
            let h = ((w.max(1) as f64) / ratio).floor() as u32;
            (w.max(1), h.max(1))
        }
        (None, Some(h)) => {
            let w = ((h.max(1) as f64) * ratio).floor() as u32;
            (w.max(1), h.max(1))
        }
        (None, None) => (ow, oh),
    }
}

/// Scales the source to fit inside `(pw, ph)` and composites it centered
/// over a checkerboard canvas, so transparent source regions show the
/// board rather than black.
fn contain_pad(src: &DynamicImage, pw: u32, ph: u32) -> RgbaImage {
    let (ow, oh) = (src.width(), src.height());
    let scale = f64::min(pw as f64 / ow as f64, ph as f64 / oh as f64);
    let sw = ((ow as f64 * scale).round() as u32).clamp(1, pw);
    let sh = ((oh as f64 * scale).round() as u32).clamp(1, ph);

    let scaled = src.resize_exact(sw, sh, FilterType::Lanczos3).into_rgba8();

    let mut canvas = checkerboard(pw, ph);
    let ox = i64::from((pw - sw) / 2);
    let oy = i64::from((ph - sh) / 2);
    image::imageops::overlay(&mut canvas, &scaled, ox, oy);
    canvas
}

/// Scales the source to cover `(pw, ph)` entirely and center-crops the
/// overflow. No padding is ever visible in this mode.
fn cover_crop(src: &DynamicImage, pw: u32, ph: u32) -> RgbaImage {
    let (ow, oh) = (src.width(), src.height());
    let scale = f64::max(pw as f64 / ow as f64, ph as f64 / oh as f64);
    let sw = ((ow as f64 * scale).round() as u32).max(pw);
    let sh = ((oh as f64 * scale).round() as u32).max(ph);

    let scaled = src.resize_exact(sw, sh, FilterType::Lanczos3);
    let cx = (sw - pw) / 2;
    let cy = (sh - ph) / 2;
    let cropped = scaled.crop_imm(cx, cy, pw, ph).into_rgba8();

    // Composite over the board anyway so transparent sources stay readable.
    let mut canvas = checkerboard(pw, ph);
    image::imageops::overlay(&mut canvas, &cropped, 0, 0);
    canvas
}

/// Builds a `w`×`h` canvas filled with a 20 px two-gray checkerboard.
fn checkerboard(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        if (x / CHECKER_SIZE + y / CHECKER_SIZE) % 2 == 0 {
            CHECKER_DARK
        } else {
            CHECKER_LIGHT
        }
    })
}
