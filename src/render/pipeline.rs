//! # Image Pipeline
//!
//! Prepares an arbitrary image for the 384-dot head.
//!
//! ```text
//! bytes ──decode──▶ Luma8 ──rotate──▶ ──resize──▶ ──contrast/brightness──▶ ──dither──▶ Raster
//!                           (CCW,       (width 384,   (only when ≠ 1.0)
//!                            expand)     Lanczos3)
//! ```
//!
//! Every step is deterministic except the random dither.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

use super::dither::{self, DitheringAlgorithm, DEFAULT_THRESHOLD};
use super::text;
use super::Raster;
use crate::error::{MxError, Result};
use crate::printer::config::PRINT_WIDTH;

/// Tallest output accepted, in dots (about 2.5 m of paper).
pub const MAX_HEIGHT: u32 = 20_000;

/// Height of the caption strip above each image in a dither preview stack.
pub const PREVIEW_LABEL_HEIGHT: u32 = 24;

/// Pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    /// Output width in dots
    pub width: u32,
    pub dither: DitheringAlgorithm,
    /// Cut-off for [`DitheringAlgorithm::None`]
    pub threshold: u8,
    /// 1.0 = unchanged
    pub contrast: f32,
    /// 1.0 = unchanged
    pub brightness: f32,
    /// Counter-clockwise, in degrees
    pub rotation: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            width: PRINT_WIDTH as u32,
            dither: DitheringAlgorithm::FloydSteinberg,
            threshold: DEFAULT_THRESHOLD,
            contrast: 1.0,
            brightness: 1.0,
            rotation: 0.0,
        }
    }
}

/// Decode any supported image format to 8-bit grayscale.
pub fn decode_image(data: &[u8]) -> Result<GrayImage> {
    if is_heic(data) {
        return decode_heic(data).map(|img| img.to_luma8());
    }
    let img = image::load_from_memory(data)?;
    Ok(img.to_luma8())
}

/// Read and decode an image file.
pub fn load_image(path: &std::path::Path) -> Result<GrayImage> {
    let data = std::fs::read(path)?;
    decode_image(&data)
}

/// Rotate counter-clockwise by `degrees`, growing the canvas to fit.
///
/// Quarter turns are exact. Other angles use nearest-neighbour sampling
/// and fill the uncovered corners with white.
pub fn rotate(img: &GrayImage, degrees: f32) -> GrayImage {
    let normalized = degrees.rem_euclid(360.0);
    if normalized == 0.0 {
        return img.clone();
    }
    if normalized == 90.0 {
        return imageops::rotate270(img);
    }
    if normalized == 180.0 {
        return imageops::rotate180(img);
    }
    if normalized == 270.0 {
        return imageops::rotate90(img);
    }

    let (w, h) = (img.width() as f32, img.height() as f32);
    let theta = normalized.to_radians();
    let (sin, cos) = theta.sin_cos();

    let new_w = (w * cos.abs() + h * sin.abs()).round().max(1.0) as u32;
    let new_h = (w * sin.abs() + h * cos.abs()).round().max(1.0) as u32;
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ncx, ncy) = (new_w as f32 / 2.0, new_h as f32 / 2.0);

    GrayImage::from_fn(new_w, new_h, |x, y| {
        let dx = x as f32 + 0.5 - ncx;
        let dy = y as f32 + 0.5 - ncy;
        let sx = (dx * cos - dy * sin + cx).floor();
        let sy = (dx * sin + dy * cos + cy).floor();
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([255])
        }
    })
}

/// Resize to `width`, keeping the aspect ratio.
///
/// The new height is `trunc(h * width / w)`, never less than 1.
///
/// ## Errors
///
/// [`MxError::Validation`] if the new height exceeds [`MAX_HEIGHT`].
pub fn resize_to_width(img: &GrayImage, width: u32) -> Result<GrayImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(MxError::Image("image has no pixels".into()));
    }
    let height = ((img.height() as u64 * width as u64) / img.width() as u64).max(1);
    if height > MAX_HEIGHT as u64 {
        return Err(MxError::Validation(format!(
            "image would be {} dots tall, limit is {}",
            height, MAX_HEIGHT
        )));
    }
    let height = height as u32;
    Ok(imageops::resize(img, width, height, FilterType::Lanczos3))
}

/// Blend every pixel toward the rounded mean gray.
pub fn adjust_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let sum: u64 = img.as_raw().iter().map(|&p| p as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5).floor() as f32;
    blend(img, mean, factor)
}

/// Blend every pixel toward black.
pub fn adjust_brightness(img: &GrayImage, factor: f32) -> GrayImage {
    blend(img, 0.0, factor)
}

/// `base + factor * (p - base)`, truncated and clamped to 0-255.
fn blend(img: &GrayImage, base: f32, factor: f32) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = base + factor * (p.0[0] as f32 - base);
        p.0[0] = v.clamp(0.0, 255.0) as u8;
    }
    out
}

/// Decode, rotate, resize and enhance, stopping before the dither.
pub fn prepare(gray: GrayImage, options: &PipelineOptions) -> Result<GrayImage> {
    let rotated = if options.rotation != 0.0 {
        rotate(&gray, options.rotation)
    } else {
        gray
    };

    let mut img = resize_to_width(&rotated, options.width)?;
    if options.contrast != 1.0 {
        img = adjust_contrast(&img, options.contrast);
    }
    if options.brightness != 1.0 {
        img = adjust_brightness(&img, options.brightness);
    }

    tracing::debug!(
        width = img.width(),
        height = img.height(),
        rotation = options.rotation,
        "prepared image"
    );
    Ok(img)
}

/// Full pipeline from a grayscale image.
pub fn preprocess_gray(gray: GrayImage, options: &PipelineOptions) -> Result<Raster> {
    let prepared = prepare(gray, options)?;
    let bw = dither::dither(&prepared, options.dither, options.threshold);
    Ok(Raster::from_luma(&bw))
}

/// Full pipeline from encoded image bytes.
///
/// ## Example
///
/// ```
/// use std::io::Cursor;
/// use image::{GrayImage, ImageFormat, Luma};
/// use mxprint::render::pipeline::{preprocess, PipelineOptions};
///
/// let mut png = Vec::new();
/// GrayImage::from_pixel(192, 96, Luma([0]))
///     .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
///     .unwrap();
///
/// let raster = preprocess(&png, &PipelineOptions::default()).unwrap();
/// assert_eq!((raster.width(), raster.height()), (384, 192));
/// ```
pub fn preprocess(source: &[u8], options: &PipelineOptions) -> Result<Raster> {
    preprocess_gray(decode_image(source)?, options)
}

/// Convert an already-monochrome image without resizing or dithering.
///
/// ## Errors
///
/// [`MxError::Validation`] unless the image is exactly [`PRINT_WIDTH`] wide.
pub fn preprocess_raw(source: &[u8]) -> Result<Raster> {
    let gray = decode_image(source)?;
    if gray.width() as usize != PRINT_WIDTH {
        return Err(MxError::Validation(format!(
            "raw image must be {} pixels wide, got {}",
            PRINT_WIDTH,
            gray.width()
        )));
    }
    Ok(Raster::from_luma(&gray))
}

/// Dither one image with every algorithm and stack the results
/// vertically, each under a caption naming it.
pub fn preview_stack(source: &[u8], options: &PipelineOptions) -> Result<GrayImage> {
    let prepared = prepare(decode_image(source)?, options)?;
    let width = prepared.width();
    let panel_height = prepared.height() + PREVIEW_LABEL_HEIGHT;
    let count = DitheringAlgorithm::ALL.len() as u32;

    let mut stack = GrayImage::from_pixel(width, panel_height * count, Luma([255]));
    for (i, algorithm) in DitheringAlgorithm::ALL.into_iter().enumerate() {
        let top = i as u32 * panel_height;
        let label = text::render_label(algorithm.name(), width, PREVIEW_LABEL_HEIGHT)?;
        imageops::replace(&mut stack, &label, 0, top as i64);

        let bw = dither::dither(&prepared, algorithm, options.threshold);
        imageops::replace(&mut stack, &bw, 0, (top + PREVIEW_LABEL_HEIGHT) as i64);
    }
    Ok(stack)
}

/// Check if the data looks like a HEIC/HEIF file by examining magic bytes.
/// HEIC files have an "ftyp" box near the start with HEIC-related brand codes.
pub fn is_heic(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &data[8..12],
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"hevm" | b"hevs" | b"mif1" | b"msf1"
    )
}

#[cfg(feature = "heif")]
fn decode_heic(data: &[u8]) -> Result<DynamicImage> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(data)
        .map_err(|e| MxError::Image(format!("Failed to read HEIC: {}", e)))?;
    let handle = ctx
        .primary_image_handle()
        .map_err(|e| MxError::Image(format!("Failed to get primary image: {}", e)))?;
    let image = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| MxError::Image(format!("Failed to decode HEIC image: {}", e)))?;

    let planes = image.planes();
    let interleaved = planes
        .interleaved
        .ok_or_else(|| MxError::Image("No interleaved RGB data in HEIC".into()))?;

    let (width, height) = (image.width(), image.height());
    let stride = interleaved.stride;
    let rgb = image::RgbImage::from_fn(width, height, |x, y| {
        let offset = y as usize * stride + x as usize * 3;
        match interleaved.data.get(offset..offset + 3) {
            Some(px) => image::Rgb([px[0], px[1], px[2]]),
            None => image::Rgb([255, 255, 255]),
        }
    });
    Ok(DynamicImage::ImageRgb8(rgb))
}

#[cfg(not(feature = "heif"))]
fn decode_heic(_data: &[u8]) -> Result<DynamicImage> {
    Err(MxError::Image(
        "HEIC/HEIF input needs the `heif` feature".into(),
    ))
}
