//! # Printer Transport Layer
//!
//! Moves frame bytes to the printer and notifications back.
//!
//! ## Layers
//!
//! - [`Link`]: the raw duplex channel (write, subscribe, await one
//!   notification). BLE stacks and character devices implement this.
//! - [`session::Session`]: owns one link, paces writes in small chunks and
//!   pairs a request with its response under a timeout.
//!
//! ## Available Links
//!
//! - [`rfcomm::RfcommLink`]: a bound `/dev/rfcommN` serial device (Linux)
//!
//! No GATT link ships with the crate. One built on a BLE stack writes frames
//! to [`WRITE_CHARACTERISTIC_UUID`] and reads responses from notifications on
//! [`NOTIFY_CHARACTERISTIC_UUID`]:
//!
//! ```
//! use mxprint::transport::{NOTIFY_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID};
//!
//! // 16-bit short forms ae01 / ae02 in the Bluetooth base UUID
//! assert_eq!(&WRITE_CHARACTERISTIC_UUID[4..8], "ae01");
//! assert_eq!(&NOTIFY_CHARACTERISTIC_UUID[4..8], "ae02");
//! ```

pub mod rfcomm;
pub mod session;

use async_trait::async_trait;

use crate::error::Result;

pub use rfcomm::RfcommLink;
pub use session::{Session, SessionState};

/// GATT characteristic the host writes frames to.
pub const WRITE_CHARACTERISTIC_UUID: &str = "0000ae01-0000-1000-8000-00805f9b34fb";

/// GATT characteristic the printer notifies responses on.
pub const NOTIFY_CHARACTERISTIC_UUID: &str = "0000ae02-0000-1000-8000-00805f9b34fb";

/// A duplex byte channel to one printer.
///
/// Implementations do no pacing or timeouts of their own; [`Session`]
/// handles both.
#[async_trait]
pub trait Link: Send {
    /// Open the channel to `address`.
    async fn connect(&mut self, address: &str) -> Result<()>;

    /// Write one block of bytes as a single transmission.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Start receiving notifications.
    async fn subscribe(&mut self) -> Result<()>;

    /// Wait for the next notification. May wait forever.
    async fn next_notification(&mut self) -> Result<Vec<u8>>;

    /// Stop receiving notifications.
    async fn unsubscribe(&mut self) -> Result<()>;

    /// Close the channel. Closing a closed link is not an error.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Lowercase hex without separators, for TX/RX logging.
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}
