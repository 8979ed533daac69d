//! # Error Types
//!
//! This module defines error types used throughout the mxprint library.
//!
//! Every failure carries a kind (see [`MxError::kind`]) so that the CLI and
//! the HTTP surface can report a structured result instead of crashing.

use thiserror::Error;

/// Main error type for mxprint operations
#[derive(Debug, Error)]
pub enum MxError {
    /// Transport unreachable, link refused, or a write failed mid-job
    #[error("Connection error: {0}")]
    Connection(String),

    /// No notification arrived within the response deadline.
    /// The connection itself stays open.
    #[error("Timed out after {0} ms waiting for a printer response")]
    Timeout(u64),

    /// Response too short or malformed for the command issued
    #[error("Protocol decode error: {0}")]
    Decode(String),

    /// Non-binary pixel, raster width mismatch, or an out-of-range parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or placeholder device address, unreadable config
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A named preset that does not exist
    #[error("Unknown {kind} preset '{name}'")]
    UnknownPreset { kind: &'static str, name: String },

    /// Printer answered the status query with one or more fault conditions
    #[error("Printer not ready: {0}")]
    NotReady(String),

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MxError {
    /// Stable, machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MxError::Connection(_) => "connection",
            MxError::Timeout(_) => "timeout",
            MxError::Decode(_) => "decode",
            MxError::Validation(_) => "validation",
            MxError::Configuration(_) => "configuration",
            MxError::UnknownPreset { .. } => "unknown_preset",
            MxError::NotReady(_) => "not_ready",
            MxError::Image(_) => "image",
            MxError::Io(_) => "io",
            MxError::Json(_) => "json",
        }
    }
}

impl From<image::ImageError> for MxError {
    fn from(e: image::ImageError) -> Self {
        MxError::Image(e.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, MxError>;
