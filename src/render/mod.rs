//! # Rendering Module
//!
//! Turns images and text into the 1-bit raster the printer consumes.
//!
//! ## Modules
//!
//! - [`dither`]: Nine grayscale→binary strategies
//! - [`pipeline`]: Decode, rotate, resize, enhance, dither
//! - [`text`]: Word-wrapped text rendering with TTF or built-in bitmap font
//!
//! ## Usage Example
//!
//! ```
//! use image::{GrayImage, Luma};
//! use mxprint::render::Raster;
//! use mxprint::render::dither::{self, DitheringAlgorithm};
//!
//! let gray = GrayImage::from_pixel(384, 10, Luma([90]));
//! let bw = dither::dither(&gray, DitheringAlgorithm::Bayer, 128);
//! let raster = Raster::from_luma(&bw);
//!
//! assert_eq!(raster.width(), 384);
//! assert_eq!(raster.height(), 10);
//! ```

pub mod dither;
pub mod pipeline;
pub mod text;

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};

use crate::error::{MxError, Result};

/// Luma values below this are printed.
pub const BLACK_CUTOFF: u8 = 128;

/// Monochrome raster, 1 = black dot, 0 = blank.
///
/// Rows are stored contiguously; every row has the same width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Raster {
    /// Blank raster.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Build from explicit rows.
    ///
    /// ## Errors
    ///
    /// [`MxError::Validation`] if rows differ in width or hold values other
    /// than 0 and 1.
    pub fn from_rows(rows: Vec<Vec<u8>>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let height = rows.len();
        let mut data = Vec::with_capacity(width * height);

        for (y, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(MxError::Validation(format!(
                    "row {} is {} pixels wide, expected {}",
                    y,
                    row.len(),
                    width
                )));
            }
            if let Some(&v) = row.iter().find(|&&v| v > 1) {
                return Err(MxError::Validation(format!(
                    "row {} has non-binary value {}",
                    y, v
                )));
            }
            data.extend(row);
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Threshold a grayscale image: values below [`BLACK_CUTOFF`] print.
    pub fn from_luma(gray: &GrayImage) -> Self {
        let data = gray
            .as_raw()
            .iter()
            .map(|&p| (p < BLACK_CUTOFF) as u8)
            .collect();
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.height).map(move |y| self.row(y))
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Count of black dots, handy for logging print density.
    pub fn black_dots(&self) -> usize {
        self.data.iter().filter(|&&p| p != 0).count()
    }

    /// Render back to grayscale, black = 0 and white = 255.
    pub fn to_gray(&self) -> GrayImage {
        let pixels = self
            .data
            .iter()
            .map(|&p| if p != 0 { 0 } else { 255 })
            .collect();
        GrayImage::from_raw(self.width as u32, self.height as u32, pixels)
            .unwrap_or_else(|| GrayImage::from_pixel(self.width as u32, self.height as u32, Luma([255])))
    }

    /// Encode as a PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        gray_to_png(&self.to_gray())
    }
}

/// Encode a grayscale image as PNG bytes.
pub fn gray_to_png(img: &GrayImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| MxError::Image(format!("Failed to encode PNG: {}", e)))?;
    Ok(png_bytes)
}
