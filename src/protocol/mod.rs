//! # V5G Protocol Implementation
//!
//! Byte-level codec for V5G-family (MX11 and relatives) Bluetooth thermal
//! printers.
//!
//! ## Module Structure
//!
//! - [`checksum`]: Table-driven frame checksum
//! - [`row`]: Run-length / packed-bitmap raster row encoding
//! - [`commands`]: Frame envelope, command builders and the print job
//! - [`status`]: Status and serial-number responses
//!
//! ## Usage Example
//!
//! ```
//! use mxprint::protocol::commands::{self, JobSettings};
//! use mxprint::render::Raster;
//!
//! let raster = Raster::new(384, 2);
//! let frames = commands::print_job(&raster, &JobSettings::default()).unwrap();
//! let bytes = commands::frames_to_bytes(&frames);
//!
//! // status, quality, energy, apply, lattice, 2 rows, feed, lattice, status
//! assert_eq!(frames.len(), 10);
//! assert_eq!(&bytes[..2], &[0x51, 0x78]);
//! ```

pub mod checksum;
pub mod commands;
pub mod row;
pub mod status;

pub use commands::{Frame, JobSettings};
pub use row::EncodedRow;
pub use status::PrinterStatus;
