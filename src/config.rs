//! # User Configuration
//!
//! A small JSON file holding the printer address and default job settings.
//!
//! ```json
//! {
//!   "mac_address": "48:0F:57:12:34:56",
//!   "loglevel": "info",
//!   "font": "DejaVuSans.ttf",
//!   "fontsize": 24,
//!   "defaults": {
//!     "concentration": 65535,
//!     "speed": 60,
//!     "feed_lines": 20,
//!     "image_binarization": "floyd-steinberg"
//!   }
//! }
//! ```
//!
//! Only `mac_address` and `defaults` are written to a fresh file; the
//! other keys are optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MxError, Result};
use crate::render::dither::DitheringAlgorithm;

/// Default file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "config.json";

/// Address written to a fresh config file. Never a real device.
pub const PLACEHOLDER_ADDRESS: &str = "XX:XX:XX:XX:XX:XX";

fn default_concentration() -> u16 {
    0xFFFF
}
fn default_speed() -> u8 {
    60
}
fn default_feed_lines() -> u16 {
    20
}
fn default_binarization() -> String {
    DitheringAlgorithm::FloydSteinberg.name().to_string()
}

/// Per-job defaults used when the command line does not say otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_concentration")]
    pub concentration: u16,
    #[serde(default = "default_speed")]
    pub speed: u8,
    #[serde(default = "default_feed_lines")]
    pub feed_lines: u16,
    #[serde(default = "default_binarization")]
    pub image_binarization: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            concentration: default_concentration(),
            speed: default_speed(),
            feed_lines: default_feed_lines(),
            image_binarization: default_binarization(),
        }
    }
}

impl Defaults {
    pub fn dither(&self) -> DitheringAlgorithm {
        DitheringAlgorithm::from_name(&self.image_binarization)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fontsize: Option<f32>,
    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mac_address: PLACEHOLDER_ADDRESS.to_string(),
            loglevel: None,
            font: None,
            fontsize: None,
            defaults: Defaults::default(),
        }
    }
}

impl Config {
    /// Read `path`, or write and return the defaults if it does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_or_create_with(path, |_| {})
    }

    /// Like [`Config::load_or_create`], but hand the file's log level to
    /// `init_logging` before anything is logged.
    pub fn load_or_create_with(
        path: impl AsRef<Path>,
        init_logging: impl FnOnce(Option<&str>),
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let loaded = Self::load(path);
            let level = loaded.as_ref().ok().and_then(|c| c.loglevel.as_deref());
            init_logging(level);
            return loaded;
        }
        init_logging(None);

        tracing::warn!(
            "configuration file {} not found, creating defaults",
            path.display()
        );
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            MxError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            MxError::Configuration(format!("invalid {}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// The device address to use: `explicit` if given, else the configured
    /// one.
    ///
    /// ## Errors
    ///
    /// [`MxError::Configuration`] when the result is empty or still the
    /// placeholder.
    pub fn address(&self, explicit: Option<&str>) -> Result<String> {
        let address = explicit.unwrap_or(&self.mac_address).trim();
        if address.is_empty() || address.eq_ignore_ascii_case(PLACEHOLDER_ADDRESS) {
            return Err(MxError::Configuration(format!(
                "printer address not configured; set mac_address in {} or pass --mac",
                CONFIG_FILE
            )));
        }
        Ok(address.to_string())
    }
}

/// Resolve the config path: an explicit one, or [`CONFIG_FILE`] in the
/// working directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}
