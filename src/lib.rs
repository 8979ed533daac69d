//! # mxprint - V5G Thermal Printer Library
//!
//! mxprint drives V5G-family (MX11 and relatives) Bluetooth thermal printers.
//! It provides:
//!
//! - **Protocol implementation**: frame envelope, checksum, row encoding
//! - **Image pipeline**: rotate, resize, enhance and dither to 1-bit
//! - **Text rendering**: TTF or built-in bitmap font to a printable raster
//! - **Transport**: paced, timeout-aware sessions over any duplex link
//!
//! ## Quick Start
//!
//! ```no_run
//! use mxprint::{
//!     printer::{config::Darkness, Printer},
//!     protocol::JobSettings,
//!     render::pipeline::PipelineOptions,
//!     transport::RfcommLink,
//! };
//!
//! # async fn run() -> mxprint::Result<()> {
//! let mut printer = Printer::new(RfcommLink::new(), "/dev/rfcomm0");
//! printer.connect().await?;
//! printer.ensure_ready().await?;
//!
//! let settings = JobSettings {
//!     energy: Darkness::DARK.concentration(),
//!     extra_feed: 20,
//! };
//! let photo = std::fs::read("photo.jpg")?;
//! printer.print_image(&photo, &PipelineOptions::default(), &settings).await?;
//!
//! printer.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Frames, commands, row encoding, status decoding |
//! | [`render`] | Raster type, image pipeline, dithering, text |
//! | [`transport`] | Link trait, session state machine, RFCOMM link |
//! | [`printer`] | Hardware profile, presets, high-level printer handle |
//! | [`config`] | JSON user configuration |
//! | [`server`] | HTTP interface |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! Currently tested with:
//! - MX11 (384 dots, 200 DPI, Bluetooth)
//!
//! The bundled link talks to a printer bound to an RFCOMM device node. Other
//! printers speaking the `51 78` frame format should work unchanged. A BLE
//! stack can drive them directly by implementing [`transport::Link`] over the
//! characteristics named in [`transport`].

pub mod config;
pub mod error;
pub mod logging;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use error::{MxError, Result};
pub use printer::{Printer, PrinterProfile};
pub use render::Raster;
pub use transport::{RfcommLink, Session};
