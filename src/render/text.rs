//! # Text Rendering
//!
//! Lays text out on a print-width canvas for the image pipeline.
//!
//! Fonts are TrueType files loaded with `ab_glyph`. A bare file name is
//! looked up in the usual system font directories. When no font can be
//! loaded, text falls back to the built-in Spleen 12x24 bitmap font.
//!
//! ## Layout
//!
//! - One paragraph per `\n`; empty paragraphs produce no line
//! - Words split on single spaces and wrap by measured width
//! - A word wider than the canvas gets a line of its own and is clipped
//! - Line height is `ascent - descent` of the font

use std::path::{Path, PathBuf};

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{GrayImage, Luma};
use spleen_font::{PSF2Font, FONT_12X24};

use super::dither::{self, DitheringAlgorithm, DEFAULT_THRESHOLD};
use super::Raster;
use crate::error::{MxError, Result};
use crate::printer::config::PRINT_WIDTH;

/// Spleen cell size
const BITMAP_CELL: (usize, usize) = (12, 24);

/// Deepest directory level searched below each font root.
const FONT_SEARCH_DEPTH: usize = 4;

/// Text rendering parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    /// Canvas width in dots
    pub width: u32,
    /// TTF path or file name; `None` uses the built-in font
    pub font: Option<String>,
    /// Pixel size
    pub size: f32,
    pub dither: DitheringAlgorithm,
    pub threshold: u8,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            width: PRINT_WIDTH as u32,
            font: None,
            size: 20.0,
            dither: DitheringAlgorithm::FloydSteinberg,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// A loaded font at a fixed size.
pub enum TextFont {
    Ttf { font: FontArc, scale: PxScale },
    /// Spleen 12x24, scaled by an integer factor
    Bitmap { factor: usize },
}

impl TextFont {
    /// Load `name` at `size` pixels, falling back to the bitmap font.
    pub fn load(name: Option<&str>, size: f32) -> Result<Self> {
        if let Some(name) = name {
            match load_ttf(name) {
                Some(font) => {
                    return Ok(TextFont::Ttf {
                        font,
                        scale: PxScale::from(size),
                    });
                }
                None => {
                    tracing::warn!("could not load font '{}', using built-in font", name);
                }
            }
        }
        Ok(Self::bitmap(size))
    }

    /// The built-in Spleen font scaled to roughly `size` pixels tall.
    pub fn bitmap(size: f32) -> Self {
        let factor = (size / BITMAP_CELL.1 as f32).round().max(1.0) as usize;
        TextFont::Bitmap { factor }
    }

    pub fn line_height(&self) -> u32 {
        match self {
            TextFont::Ttf { font, scale } => {
                let scaled = font.as_scaled(*scale);
                (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32
            }
            TextFont::Bitmap { factor, .. } => (BITMAP_CELL.1 * factor) as u32,
        }
    }

    /// Advance width of `line` in pixels.
    pub fn measure(&self, line: &str) -> f32 {
        match self {
            TextFont::Ttf { font, scale } => {
                let scaled = font.as_scaled(*scale);
                let mut width = 0.0;
                let mut prev = None;
                for ch in line.chars() {
                    let id = scaled.glyph_id(ch);
                    if let Some(p) = prev {
                        width += scaled.kern(p, id);
                    }
                    width += scaled.h_advance(id);
                    prev = Some(id);
                }
                width
            }
            TextFont::Bitmap { factor, .. } => {
                (line.chars().count() * BITMAP_CELL.0 * factor) as f32
            }
        }
    }

    /// Draw one line with its top edge at `top`.
    fn draw_line(&self, canvas: &mut GrayImage, line: &str, top: u32) -> Result<()> {
        let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
        match self {
            TextFont::Ttf { font, scale } => {
                let scaled = font.as_scaled(*scale);
                let baseline = top as f32 + scaled.ascent();
                let mut caret = 0.0f32;
                let mut prev = None;

                for c in line.chars() {
                    let id = scaled.glyph_id(c);
                    if let Some(p) = prev {
                        caret += scaled.kern(p, id);
                    }
                    let glyph = id.with_scale_and_position(*scale, point(caret, baseline));
                    caret += scaled.h_advance(id);
                    prev = Some(id);

                    let Some(outlined) = font.outline_glyph(glyph) else {
                        continue;
                    };
                    let bounds = outlined.px_bounds();
                    outlined.draw(|px, py, coverage| {
                        let x = px as i64 + bounds.min.x as i64;
                        let y = py as i64 + bounds.min.y as i64;
                        if x >= 0 && x < cw && y >= 0 && y < ch {
                            let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                            let ink = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
                            pixel.0[0] = pixel.0[0].saturating_sub(ink);
                        }
                    });
                }
            }
            TextFont::Bitmap { factor } => {
                let factor = *factor as i64;
                let mut spleen = PSF2Font::new(FONT_12X24)
                    .map_err(|_| MxError::Image("built-in font failed to load".into()))?;
                for (i, c) in line.chars().enumerate() {
                    let utf8 = c.to_string();
                    let Some(glyph) = spleen.glyph_for_utf8(utf8.as_bytes()) else {
                        continue;
                    };
                    let left = i as i64 * BITMAP_CELL.0 as i64 * factor;
                    for (gy, row) in glyph.enumerate() {
                        for (gx, on) in row.enumerate() {
                            if !on {
                                continue;
                            }
                            for sy in 0..factor {
                                for sx in 0..factor {
                                    let x = left + gx as i64 * factor + sx;
                                    let y = top as i64 + gy as i64 * factor + sy;
                                    if x >= 0 && x < cw && y >= 0 && y < ch {
                                        canvas.put_pixel(x as u32, y as u32, Luma([0]));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Split `text` into lines that fit `width` pixels.
pub fn wrap_lines(text: &str, font: &TextFont, width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split(' ') {
            let candidate = if line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", line, word)
            };
            if font.measure(&candidate) > width && !line.is_empty() {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            } else {
                line = candidate;
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Render `text` black on white, `options.width` wide.
pub fn render_text(text: &str, options: &TextOptions) -> Result<GrayImage> {
    let font = TextFont::load(options.font.as_deref(), options.size)?;
    let lines = wrap_lines(text, &font, options.width as f32);
    let line_height = font.line_height();

    let mut canvas = GrayImage::from_pixel(
        options.width,
        line_height * lines.len() as u32,
        Luma([255]),
    );
    for (i, line) in lines.iter().enumerate() {
        font.draw_line(&mut canvas, line, i as u32 * line_height)?;
    }

    tracing::debug!(lines = lines.len(), height = canvas.height(), "rendered text");
    Ok(canvas)
}

/// Render and dither text into a print-ready raster.
pub fn preprocess_text(text: &str, options: &TextOptions) -> Result<Raster> {
    let gray = render_text(text, options)?;
    let bw = dither::dither(&gray, options.dither, options.threshold);
    Ok(Raster::from_luma(&bw))
}

/// A single-line caption in the built-in font, `height` pixels tall.
pub fn render_label(label: &str, width: u32, height: u32) -> Result<GrayImage> {
    let font = TextFont::bitmap(BITMAP_CELL.1 as f32);
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    font.draw_line(&mut canvas, label, 0)?;
    Ok(canvas)
}

fn load_ttf(name: &str) -> Option<FontArc> {
    let path = resolve_font_path(name)?;
    let data = std::fs::read(&path).ok()?;
    match FontArc::try_from_vec(data) {
        Ok(font) => {
            tracing::debug!("loaded font {}", path.display());
            Some(font)
        }
        Err(e) => {
            tracing::warn!("{} is not a usable font: {}", path.display(), e);
            None
        }
    }
}

/// Find a font by path, or by file name in the system font directories.
pub fn resolve_font_path(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.is_file() {
        return Some(direct.to_path_buf());
    }
    let file_name = direct.file_name()?.to_string_lossy().to_lowercase();
    font_dirs()
        .iter()
        .find_map(|dir| find_file(dir, &file_name, FONT_SEARCH_DEPTH))
}

fn font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(windir) = std::env::var("WINDIR") {
        dirs.push(Path::new(&windir).join("Fonts"));
    }
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(Path::new(&home).join(".local/share/fonts"));
        dirs.push(Path::new(&home).join(".fonts"));
        dirs.push(Path::new(&home).join("Library/Fonts"));
    }
    for dir in [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
    ] {
        dirs.push(PathBuf::from(dir));
    }
    dirs
}

fn find_file(dir: &Path, file_name: &str, depth: usize) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if entry.file_name().to_string_lossy().to_lowercase() == file_name {
            return Some(path);
        }
    }
    if depth == 0 {
        return None;
    }
    subdirs
        .iter()
        .find_map(|sub| find_file(sub, file_name, depth - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap() -> TextFont {
        TextFont::bitmap(24.0)
    }

    #[test]
    fn test_wrap_short_line() {
        assert_eq!(wrap_lines("hello world", &bitmap(), 384.0), vec!["hello world"]);
    }

    #[test]
    fn test_wrap_by_width() {
        // 12 px per char, 384 px → 32 chars per line
        let text = "aaaaaaaaaa bbbbbbbbbb cccccccccc dddddddddd";
        let lines = wrap_lines(text, &bitmap(), 384.0);
        assert_eq!(
            lines,
            vec!["aaaaaaaaaa bbbbbbbbbb cccccccccc", "dddddddddd"]
        );
    }

    #[test]
    fn test_long_word_gets_own_line() {
        let word = "x".repeat(40);
        let text = format!("a {} b", word);
        let lines = wrap_lines(&text, &bitmap(), 384.0);
        assert_eq!(lines, vec!["a".to_string(), word, "b".to_string()]);
    }

    #[test]
    fn test_empty_paragraphs_skipped() {
        let lines = wrap_lines("one\n\ntwo\n", &bitmap(), 384.0);
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_render_canvas_size() {
        let options = TextOptions {
            size: 24.0,
            ..Default::default()
        };
        let img = render_text("line one\nline two", &options).unwrap();
        assert_eq!(img.width(), 384);
        assert_eq!(img.height(), 48);
        assert!(img.pixels().any(|p| p.0[0] == 0));
        assert!(img.pixels().any(|p| p.0[0] == 255));
    }

    #[test]
    fn test_render_empty_text() {
        let img = render_text("", &TextOptions::default()).unwrap();
        assert_eq!(img.height(), 0);
    }

    #[test]
    fn test_missing_font_falls_back() {
        let font = TextFont::load(Some("definitely-not-a-font-9f3a.ttf"), 48.0).unwrap();
        assert!(matches!(font, TextFont::Bitmap { factor: 2 }));
        assert_eq!(font.line_height(), 48);
    }

    #[test]
    fn test_preprocess_text_is_binary_raster() {
        let raster = preprocess_text("Hi", &TextOptions::default()).unwrap();
        assert_eq!(raster.width(), PRINT_WIDTH);
        assert_eq!(raster.height(), 24);
        assert!(raster.black_dots() > 0);
    }

    #[test]
    fn test_label_dimensions() {
        let label = render_label("bayer", 384, 24).unwrap();
        assert_eq!(label.dimensions(), (384, 24));
        assert!(label.pixels().any(|p| p.0[0] == 0));
    }
}
