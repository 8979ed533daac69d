//! # Status Responses
//!
//! The printer answers a status query (0xA3) with a notification in the
//! normal frame envelope. Byte 6, the first payload byte, is a bitfield:
//!
//! | Bit | Meaning      |
//! |-----|--------------|
//! | 0   | No paper     |
//! | 2   | Overheating  |
//! | 3   | Low battery  |
//!
//! A zero byte means the printer is ready. Several bits can be set at once.

use std::fmt;

use crate::error::{MxError, Result};

/// Offset of the first payload byte in a response frame
pub const PAYLOAD_OFFSET: usize = 6;

/// Shortest response that carries a status byte
pub const MIN_STATUS_LEN: usize = 10;

pub const STATUS_NO_PAPER: u8 = 0b0000_0001;
pub const STATUS_OVERHEATING: u8 = 0b0000_0100;
pub const STATUS_LOW_BATTERY: u8 = 0b0000_1000;

/// Decoded printer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrinterStatus {
    /// Raw status byte
    pub raw: u8,
    pub no_paper: bool,
    pub overheating: bool,
    pub low_battery: bool,
}

impl PrinterStatus {
    pub fn from_byte(raw: u8) -> Self {
        Self {
            raw,
            no_paper: raw & STATUS_NO_PAPER != 0,
            overheating: raw & STATUS_OVERHEATING != 0,
            low_battery: raw & STATUS_LOW_BATTERY != 0,
        }
    }

    /// True when the status byte is zero.
    pub fn is_ready(&self) -> bool {
        self.raw == 0
    }

    /// Human-readable names of every active fault.
    ///
    /// Bits outside the known set are reported by value.
    pub fn faults(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.no_paper {
            out.push("no paper".to_string());
        }
        if self.overheating {
            out.push("overheating".to_string());
        }
        if self.low_battery {
            out.push("low battery".to_string());
        }
        let unknown = self.raw & !(STATUS_NO_PAPER | STATUS_OVERHEATING | STATUS_LOW_BATTERY);
        if unknown != 0 {
            out.push(format!("unknown status bits {:#04x}", unknown));
        }
        out
    }
}

impl fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ready() {
            write!(f, "ready")
        } else {
            write!(f, "{}", self.faults().join(", "))
        }
    }
}

/// Decode a status response.
///
/// ## Errors
///
/// [`MxError::Decode`] if the response is shorter than [`MIN_STATUS_LEN`].
pub fn decode_status(response: &[u8]) -> Result<PrinterStatus> {
    if response.len() < MIN_STATUS_LEN {
        return Err(MxError::Decode(format!(
            "status response too short: {} bytes (need {})",
            response.len(),
            MIN_STATUS_LEN
        )));
    }
    Ok(PrinterStatus::from_byte(response[PAYLOAD_OFFSET]))
}

/// Decode a serial-number response: the ASCII text between the header and
/// the trailing checksum/terminator pair.
pub fn decode_serial(response: &[u8]) -> Result<String> {
    if response.len() < PAYLOAD_OFFSET + 2 {
        return Err(MxError::Decode(format!(
            "serial response too short: {} bytes",
            response.len()
        )));
    }
    let text = &response[PAYLOAD_OFFSET..response.len() - 2];
    if !text.is_ascii() {
        return Err(MxError::Decode("serial number is not ASCII".into()));
    }
    Ok(String::from_utf8_lossy(text).into_owned())
}
