//! # Printer Configuration
//!
//! Hardware profile and setting presets for V5G-family printers.
//!
//! ## Supported Printers
//!
//! | Model | Width (dots) | Resolution | Default speed | Default concentration |
//! |-------|--------------|------------|---------------|-----------------------|
//! | MX11 (V5G) | 384 | 200 DPI | 60 | 110 |
//!
//! ## Usage
//!
//! ```
//! use mxprint::printer::config::{Darkness, Speed, PrinterProfile};
//!
//! let profile = PrinterProfile::V5G;
//! assert!(profile.supports_labels);
//!
//! let darkness = Darkness::parse("dark").unwrap();
//! assert_eq!(darkness.concentration(), 137);
//! assert_eq!(Speed::from_name("slow").value(), 3);
//! ```

use std::fmt;

use crate::error::{MxError, Result};

/// Fixed print-head width in dots.
pub const PRINT_WIDTH: usize = 384;

/// Resolution in dots per inch.
pub const DPI: u16 = 200;

/// # Printer Profile
///
/// Immutable per-model defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterProfile {
    /// Printer family name
    pub name: &'static str,

    /// Default print speed
    pub speed: u8,

    /// Default concentration
    pub concentration: u16,

    /// Whether the label-gap calibration command is supported
    pub supports_labels: bool,
}

impl PrinterProfile {
    /// # V5G Family (MX11 and relatives)
    ///
    /// ```text
    /// ├──────── 48mm printable ────────┤
    /// │           384 dots             │
    /// ```
    pub const V5G: Self = Self {
        name: "V5G",
        speed: 60,
        concentration: 110,
        supports_labels: true,
    };

    /// Calculate dots per millimeter
    #[inline]
    pub fn dots_per_mm(&self) -> f32 {
        DPI as f32 / 25.4
    }

    /// Convert millimeters to dots
    #[inline]
    pub fn mm_to_dots(&self, mm: f32) -> u16 {
        (mm * self.dots_per_mm()).round() as u16
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::V5G
    }
}

// ============================================================================
// SPEED
// ============================================================================

/// Print speed preset. Lower values print faster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    Fast,
    #[default]
    Medium,
    Slow,
}

impl Speed {
    /// Resolve a preset name. Unknown names fall back to [`Speed::Medium`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "fast" => Speed::Fast,
            "medium" => Speed::Medium,
            "slow" => Speed::Slow,
            other => {
                tracing::warn!("unknown speed preset '{}', using medium", other);
                Speed::Medium
            }
        }
    }

    /// Value for the set-speed command
    pub fn value(self) -> u8 {
        match self {
            Speed::Fast => 1,
            Speed::Medium => 2,
            Speed::Slow => 3,
        }
    }
}

/// Raw speed value from a number or a preset name.
///
/// ```
/// use mxprint::printer::config::parse_speed;
///
/// assert_eq!(parse_speed("60"), 60);
/// assert_eq!(parse_speed("fast"), 1);
/// assert_eq!(parse_speed("warp"), 2);
/// ```
pub fn parse_speed(s: &str) -> u8 {
    match s.trim().parse::<u8>() {
        Ok(n) => n,
        Err(_) => Speed::from_name(s).value(),
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Speed::Fast => "fast",
            Speed::Medium => "medium",
            Speed::Slow => "slow",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// DARKNESS
// ============================================================================

/// Darkness on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Darkness(u8);

impl Darkness {
    pub const LIGHT: Self = Self(25);
    pub const MEDIUM: Self = Self(50);
    pub const DARK: Self = Self(75);
    pub const MAX: Self = Self(100);

    /// Percentage, clamped to 0-100.
    pub fn percent(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    /// Look up a named preset.
    ///
    /// ## Errors
    ///
    /// [`MxError::UnknownPreset`] for names other than
    /// `light`, `medium`, `dark` and `max`.
    pub fn from_preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::LIGHT),
            "medium" => Ok(Self::MEDIUM),
            "dark" => Ok(Self::DARK),
            "max" => Ok(Self::MAX),
            _ => Err(MxError::UnknownPreset {
                kind: "darkness",
                name: name.to_string(),
            }),
        }
    }

    /// Accept either a number (clamped) or a preset name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().parse::<i64>() {
            Ok(n) => Ok(Self::percent(n)),
            Err(_) => Self::from_preset(s),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Concentration value for this darkness.
    pub fn concentration(self) -> u16 {
        darkness_to_concentration(self.0 as i64)
    }
}

/// Map darkness 0-100 onto the printer's useful concentration band 100-150.
///
/// Out-of-range input is clamped; the result is truncated toward zero.
///
/// ```
/// use mxprint::printer::config::darkness_to_concentration;
///
/// assert_eq!(darkness_to_concentration(0), 100);
/// assert_eq!(darkness_to_concentration(25), 112);
/// assert_eq!(darkness_to_concentration(100), 150);
/// assert_eq!(darkness_to_concentration(250), 150);
/// ```
pub fn darkness_to_concentration(darkness: i64) -> u16 {
    let d = darkness.clamp(0, 100) as f64;
    (100.0 + d * 50.0 / 100.0) as u16
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v5g_profile() {
        let profile = PrinterProfile::V5G;
        assert_eq!(profile.speed, 60);
        assert_eq!(profile.concentration, 110);
        assert!(profile.supports_labels);
        assert_eq!(PrinterProfile::default(), profile);
    }

    #[test]
    fn test_print_width_mm() {
        let profile = PrinterProfile::V5G;
        let width_mm = PRINT_WIDTH as f32 / profile.dots_per_mm();
        // 384 dots at 200 DPI ≈ 48mm
        assert!((width_mm - 48.8).abs() < 0.5);
        assert_eq!(profile.mm_to_dots(10.0), 79);
    }

    #[test]
    fn test_speed_presets() {
        assert_eq!(Speed::from_name("fast").value(), 1);
        assert_eq!(Speed::from_name("Medium").value(), 2);
        assert_eq!(Speed::from_name("SLOW").value(), 3);
        assert_eq!(Speed::from_name("ludicrous"), Speed::Medium);
        assert_eq!(Speed::default(), Speed::Medium);
    }

    #[test]
    fn test_darkness_presets() {
        assert_eq!(Darkness::from_preset("light").unwrap().concentration(), 112);
        assert_eq!(Darkness::from_preset("medium").unwrap().concentration(), 125);
        assert_eq!(Darkness::from_preset("dark").unwrap().concentration(), 137);
        assert_eq!(Darkness::from_preset("max").unwrap().concentration(), 150);
    }

    #[test]
    fn test_unknown_darkness_preset_fails() {
        let err = Darkness::from_preset("extreme").unwrap_err();
        assert!(matches!(
            err,
            MxError::UnknownPreset { kind: "darkness", .. }
        ));
        assert!(Darkness::parse("extreme").is_err());
    }

    #[test]
    fn test_darkness_parse_numeric() {
        assert_eq!(Darkness::parse("80").unwrap().value(), 80);
        assert_eq!(Darkness::parse("-5").unwrap().value(), 0);
        assert_eq!(Darkness::parse("400").unwrap().value(), 100);
    }

    #[test]
    fn test_concentration_mapping() {
        assert_eq!(darkness_to_concentration(0), 100);
        assert_eq!(darkness_to_concentration(100), 150);
        assert_eq!(darkness_to_concentration(-20), 100);
        assert_eq!(darkness_to_concentration(75), 137);

        let mut last = 0;
        for d in 0..=100 {
            let c = darkness_to_concentration(d);
            assert!(c >= last, "not monotonic at {}", d);
            assert!((100..=150).contains(&c));
            last = c;
        }
    }
}
