//! # Printer Module
//!
//! Hardware profile, setting presets and the high-level [`Printer`] handle.
//!
//! ## Modules
//!
//! - [`config`]: Printer hardware specifications and speed/darkness presets
//! - [`device`]: Status queries, settings and print jobs over a session

pub mod config;
pub mod device;

pub use config::{Darkness, PrinterProfile, Speed};
pub use device::Printer;
