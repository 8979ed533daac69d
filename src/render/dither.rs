//! # Dithering
//!
//! Converts an 8-bit grayscale image into pure black and white (0 / 255)
//! for the thermal head.
//!
//! ## What is Dithering?
//!
//! Dithering simulates grayscale on a device that can only print black or white.
//! By varying the density of black dots, we create the illusion of different
//! gray levels.
//!
//! ```text
//! Grayscale:    White    Light    Medium    Dark    Black
//!               ░░░░░░   ░░▒░░░   ░▒░▒░▒   ▒▓▒▓▒▓   ██████
//! ```
//!
//! ## Algorithms
//!
//! | Algorithm | Kind | Notes |
//! |-----------|------|-------|
//! | None | Threshold | caller-supplied cut-off, no diffusion |
//! | Floyd-Steinberg | Error diffusion | 4 neighbours, default |
//! | Bayer | Ordered | 8x8 matrix, deterministic, no error carry |
//! | Atkinson | Error diffusion | diffuses only 6/8 of the error, high contrast |
//! | Burkes | Error diffusion | 2 rows |
//! | Stucki | Error diffusion | 3 rows |
//! | Jarvis-Judice-Ninke | Error diffusion | 3 rows, softest |
//! | Sierra | Error diffusion | 3 rows |
//! | Random | Noise | ±64 uniform noise, then threshold |
//!
//! ## Error Diffusion
//!
//! All diffusion variants share one loop: raster scan, quantize at 127
//! (`> 127` is white), push the error onto not-yet-visited neighbours.
//! The scratch buffer is `f32` and is never clamped between steps, so
//! accumulated error keeps its full magnitude. Neighbours outside the
//! image simply lose their share.

use image::GrayImage;
use rand::Rng;
use rayon::prelude::*;

/// Cut-off used by every diffusion kernel and the random dither.
pub const DIFFUSION_THRESHOLD: f32 = 127.0;

/// Default cut-off for [`DitheringAlgorithm::None`].
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Amplitude of the random dither noise.
pub const RANDOM_NOISE: i16 = 64;

/// Bayer 8x8 dithering matrix
///
/// Values range from 0-63. Indexed as `BAYER8[x mod 8][y mod 8]` and scaled
/// by 4 to cover the 0-255 gray range.
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Error-diffusion kernel: `(dx, dy, weight)` taps over a common divisor.
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    pub taps: &'static [(i32, i32, f32)],
    pub divisor: f32,
}

impl Kernel {
    /// Fraction of the quantization error this kernel passes on.
    pub fn total_weight(&self) -> f32 {
        self.taps.iter().map(|&(_, _, w)| w).sum::<f32>() / self.divisor
    }
}

pub const FLOYD_STEINBERG: Kernel = Kernel {
    taps: &[(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)],
    divisor: 16.0,
};

pub const ATKINSON: Kernel = Kernel {
    taps: &[
        (1, 0, 1.0),
        (2, 0, 1.0),
        (-1, 1, 1.0),
        (0, 1, 1.0),
        (1, 1, 1.0),
        (0, 2, 1.0),
    ],
    divisor: 8.0,
};

pub const BURKES: Kernel = Kernel {
    taps: &[
        (1, 0, 8.0),
        (2, 0, 4.0),
        (-2, 1, 2.0),
        (-1, 1, 4.0),
        (0, 1, 8.0),
        (1, 1, 4.0),
        (2, 1, 2.0),
    ],
    divisor: 32.0,
};

pub const STUCKI: Kernel = Kernel {
    taps: &[
        (1, 0, 8.0),
        (2, 0, 4.0),
        (-2, 1, 2.0),
        (-1, 1, 4.0),
        (0, 1, 8.0),
        (1, 1, 4.0),
        (2, 1, 2.0),
        (-2, 2, 1.0),
        (-1, 2, 2.0),
        (0, 2, 4.0),
        (1, 2, 2.0),
        (2, 2, 1.0),
    ],
    divisor: 42.0,
};

pub const JARVIS_JUDICE_NINKE: Kernel = Kernel {
    taps: &[
        (1, 0, 7.0),
        (2, 0, 5.0),
        (-2, 1, 3.0),
        (-1, 1, 5.0),
        (0, 1, 7.0),
        (1, 1, 5.0),
        (2, 1, 3.0),
        (-2, 2, 1.0),
        (-1, 2, 3.0),
        (0, 2, 5.0),
        (1, 2, 3.0),
        (2, 2, 1.0),
    ],
    divisor: 48.0,
};

pub const SIERRA: Kernel = Kernel {
    taps: &[
        (1, 0, 5.0),
        (2, 0, 3.0),
        (-2, 1, 2.0),
        (-1, 1, 4.0),
        (0, 1, 5.0),
        (1, 1, 4.0),
        (2, 1, 2.0),
        (-1, 2, 2.0),
        (0, 2, 3.0),
        (1, 2, 2.0),
    ],
    divisor: 32.0,
};

/// Grayscale to binary strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitheringAlgorithm {
    /// Plain threshold at the caller's cut-off
    None,
    #[default]
    FloydSteinberg,
    Bayer,
    Atkinson,
    Burkes,
    Stucki,
    Jarvis,
    Sierra,
    Random,
}

impl DitheringAlgorithm {
    /// Every algorithm, in preview order.
    pub const ALL: [DitheringAlgorithm; 9] = [
        DitheringAlgorithm::FloydSteinberg,
        DitheringAlgorithm::None,
        DitheringAlgorithm::Bayer,
        DitheringAlgorithm::Atkinson,
        DitheringAlgorithm::Burkes,
        DitheringAlgorithm::Stucki,
        DitheringAlgorithm::Jarvis,
        DitheringAlgorithm::Sierra,
        DitheringAlgorithm::Random,
    ];

    /// Resolve a user-facing name. Case-insensitive.
    ///
    /// Unknown names fall back to Floyd-Steinberg.
    ///
    /// ```
    /// use mxprint::render::dither::DitheringAlgorithm;
    ///
    /// assert_eq!(DitheringAlgorithm::from_name("ordered"), DitheringAlgorithm::Bayer);
    /// assert_eq!(DitheringAlgorithm::from_name("JJN"), DitheringAlgorithm::Jarvis);
    /// assert_eq!(DitheringAlgorithm::from_name("sparkle"), DitheringAlgorithm::FloydSteinberg);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "threshold" | "manual" => DitheringAlgorithm::None,
            "floyd-steinberg" | "floyd_steinberg" | "fs" | "default" => {
                DitheringAlgorithm::FloydSteinberg
            }
            "bayer" | "ordered" => DitheringAlgorithm::Bayer,
            "atkinson" => DitheringAlgorithm::Atkinson,
            "burkes" => DitheringAlgorithm::Burkes,
            "stucki" => DitheringAlgorithm::Stucki,
            "jarvis" | "jjn" | "jarvis-judice-ninke" => DitheringAlgorithm::Jarvis,
            "sierra" => DitheringAlgorithm::Sierra,
            "random" => DitheringAlgorithm::Random,
            other => {
                tracing::warn!("unknown dither '{}', using floyd-steinberg", other);
                DitheringAlgorithm::FloydSteinberg
            }
        }
    }

    /// Canonical name, accepted by [`from_name`](Self::from_name).
    pub fn name(self) -> &'static str {
        match self {
            DitheringAlgorithm::None => "none",
            DitheringAlgorithm::FloydSteinberg => "floyd-steinberg",
            DitheringAlgorithm::Bayer => "bayer",
            DitheringAlgorithm::Atkinson => "atkinson",
            DitheringAlgorithm::Burkes => "burkes",
            DitheringAlgorithm::Stucki => "stucki",
            DitheringAlgorithm::Jarvis => "jarvis",
            DitheringAlgorithm::Sierra => "sierra",
            DitheringAlgorithm::Random => "random",
        }
    }

    /// Diffusion kernel, if this is an error-diffusion algorithm.
    pub fn kernel(self) -> Option<&'static Kernel> {
        match self {
            DitheringAlgorithm::FloydSteinberg => Some(&FLOYD_STEINBERG),
            DitheringAlgorithm::Atkinson => Some(&ATKINSON),
            DitheringAlgorithm::Burkes => Some(&BURKES),
            DitheringAlgorithm::Stucki => Some(&STUCKI),
            DitheringAlgorithm::Jarvis => Some(&JARVIS_JUDICE_NINKE),
            DitheringAlgorithm::Sierra => Some(&SIERRA),
            _ => None,
        }
    }
}

impl std::fmt::Display for DitheringAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dither `gray` to a 0/255 image of the same size.
///
/// `threshold` only applies to [`DitheringAlgorithm::None`].
pub fn dither(gray: &GrayImage, algorithm: DitheringAlgorithm, threshold: u8) -> GrayImage {
    match algorithm {
        DitheringAlgorithm::None => threshold_image(gray, threshold),
        DitheringAlgorithm::Bayer => bayer(gray),
        DitheringAlgorithm::Random => random(gray, &mut rand::rng()),
        other => match other.kernel() {
            Some(kernel) => diffuse(gray, kernel),
            None => diffuse(gray, &FLOYD_STEINBERG),
        },
    }
}

/// White iff `p > threshold`.
pub fn threshold_image(gray: &GrayImage, threshold: u8) -> GrayImage {
    map_rows(gray, |_, _, p| if p > threshold { 255 } else { 0 })
}

/// Ordered dither: white iff `p > 4 * BAYER8[x mod 8][y mod 8]`.
pub fn bayer(gray: &GrayImage) -> GrayImage {
    map_rows(gray, |x, y, p| {
        let m = BAYER8[x & 7][y & 7] as u16 * 4;
        if p as u16 > m { 255 } else { 0 }
    })
}

/// Add uniform noise in `[-64, 64]`, clamp, then threshold at 127.
pub fn random<R: Rng + ?Sized>(gray: &GrayImage, rng: &mut R) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        let noise: i16 = rng.random_range(-RANDOM_NOISE..=RANDOM_NOISE);
        let v = (src.0[0] as i16 + noise).clamp(0, 255) as f32;
        dst.0[0] = if v > DIFFUSION_THRESHOLD { 255 } else { 0 };
    }
    out
}

/// Generic error diffusion over an `f32` scratch copy.
pub fn diffuse(gray: &GrayImage, kernel: &Kernel) -> GrayImage {
    let w = gray.width() as usize;
    let h = gray.height() as usize;
    let mut buf: Vec<f32> = gray.as_raw().iter().map(|&p| p as f32).collect();

    let taps: Vec<(i32, i32, f32)> = kernel
        .taps
        .iter()
        .map(|&(dx, dy, weight)| (dx, dy, weight / kernel.divisor))
        .collect();

    for y in 0..h {
        for x in 0..w {
            let old = buf[y * w + x];
            let new = if old > DIFFUSION_THRESHOLD { 255.0 } else { 0.0 };
            let err = old - new;
            buf[y * w + x] = new;

            for &(dx, dy, factor) in &taps {
                let nx = x as i64 + dx as i64;
                let ny = y as i64 + dy as i64;
                if nx >= 0 && (nx as usize) < w && (ny as usize) < h {
                    buf[ny as usize * w + nx as usize] += err * factor;
                }
            }
        }
    }

    let data = buf.into_iter().map(|v| v as u8).collect();
    GrayImage::from_raw(gray.width(), gray.height(), data)
        .unwrap_or_else(|| GrayImage::new(gray.width(), gray.height()))
}

/// Apply a pointwise `(x, y, value) -> value` map row by row in parallel.
fn map_rows<F>(gray: &GrayImage, f: F) -> GrayImage
where
    F: Fn(usize, usize, u8) -> u8 + Sync,
{
    let w = gray.width() as usize;
    let mut out = GrayImage::new(gray.width(), gray.height());
    if w == 0 {
        return out;
    }
    out.par_chunks_mut(w)
        .zip(gray.as_raw().par_chunks(w))
        .enumerate()
        .for_each(|(y, (dst, src))| {
            for (x, (d, &s)) in dst.iter_mut().zip(src).enumerate() {
                *d = f(x, y, s);
            }
        });
    out
}

// ============================================================================
// TESTS
// ============================================================================
