//! # V5G Command Frames
//!
//! Every command the printer understands is wrapped in the same envelope:
//!
//! ```text
//! ┌──────┬──────┬─────────┬──────┬───────────────┬─────────┬──────────┬──────┐
//! │ 0x51 │ 0x78 │ command │ 0x00 │ length (u16)  │ payload │ checksum │ 0xFF │
//! └──────┴──────┴─────────┴──────┴───────────────┴─────────┴──────────┴──────┘
//!                                  little-endian              over payload
//! ```
//!
//! ## Byte Order
//!
//! The length field is **little-endian**. Payload integers are not uniform:
//! energy and concentration are big-endian, the feed line count is
//! little-endian. Each builder documents its own layout.
//!
//! ## Print Job
//!
//! A job is a fixed sequence of frames, see [`print_job`]:
//!
//! ```text
//! status → quality → set energy → apply energy → lattice start
//!        → one print-row frame per raster row
//!        → feed → lattice end → status
//! ```

use rayon::prelude::*;

use super::checksum::checksum;
use super::row::{encode_row, EncodedRow};
use crate::error::{MxError, Result};
use crate::printer::config::PRINT_WIDTH;
use crate::render::Raster;

// ============================================================================
// FRAME CONSTANTS
// ============================================================================

/// Frame start marker
pub const MAGIC: [u8; 2] = [0x51, 0x78];

/// Frame terminator
pub const TERMINATOR: u8 = 0xFF;

/// Header (magic, command, reserved, length) plus checksum and terminator
pub const FRAME_OVERHEAD: usize = 8;

/// Feed appended after every job so the last row clears the tear bar
pub const JOB_TRAILING_FEED: u16 = 8;

// Command identifiers
pub const CMD_FEED_PAPER: u8 = 0xA1;
pub const CMD_PRINT_ROW_PACKED: u8 = 0xA2;
pub const CMD_GET_STATUS: u8 = 0xA3;
pub const CMD_SET_QUALITY: u8 = 0xA4;
pub const CMD_LATTICE: u8 = 0xA6;
pub const CMD_GET_SERIAL: u8 = 0xA8;
pub const CMD_SET_ENERGY: u8 = 0xAF;
pub const CMD_APPLY_ENERGY: u8 = 0xBE;
pub const CMD_PRINT_ROW_RLE: u8 = 0xBF;
pub const CMD_LABEL_CALIBRATE: u8 = 0xF0;
pub const CMD_SET_SPEED: u8 = 0xF1;
pub const CMD_SET_CONCENTRATION: u8 = 0xF2;

/// Quality payload selecting 200 DPI
pub const QUALITY_200_DPI: u8 = 0x32;

/// Lattice bracket opening a raster transfer
pub const LATTICE_START: [u8; 11] = [
    0xAA, 0x55, 0x17, 0x38, 0x44, 0x5F, 0x5F, 0x5F, 0x44, 0x38, 0x2C,
];

/// Lattice bracket closing a raster transfer
pub const LATTICE_END: [u8; 11] = [
    0xAA, 0x55, 0x17, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x17,
];

// ============================================================================
// FRAME
// ============================================================================

/// One command frame.
///
/// The length field and checksum are derived from the payload when the frame
/// is serialized, so a `Frame` can never carry an inconsistent length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: u8, payload: Vec<u8>) -> Self {
        Self { command, payload }
    }

    /// Value of the length field.
    pub fn length_field(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Checksum byte, computed over the payload only.
    pub fn checksum(&self) -> u8 {
        checksum(&self.payload, 0, self.payload.len())
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Serialize into wire bytes.
    ///
    /// ```
    /// use mxprint::protocol::commands::get_status;
    ///
    /// assert_eq!(
    ///     get_status().to_bytes(),
    ///     vec![0x51, 0x78, 0xA3, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF]
    /// );
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }

    /// Append wire bytes to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let len = self.length_field();
        out.extend_from_slice(&MAGIC);
        out.push(self.command);
        out.push(0x00);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out.push(self.checksum());
        out.push(TERMINATOR);
    }

    /// Decode one frame from the start of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed. Notifications
    /// from the printer use the same envelope as commands.
    ///
    /// ## Errors
    ///
    /// [`MxError::Decode`] on a bad marker, a truncated frame, a missing
    /// terminator or a checksum mismatch.
    pub fn parse(bytes: &[u8]) -> Result<(Frame, usize)> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(MxError::Decode(format!(
                "frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[..2] != MAGIC {
            return Err(MxError::Decode(format!(
                "bad frame marker {:02x} {:02x}",
                bytes[0], bytes[1]
            )));
        }

        let command = bytes[2];
        let len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        let total = len + FRAME_OVERHEAD;
        if bytes.len() < total {
            return Err(MxError::Decode(format!(
                "frame declares {} payload bytes but only {} available",
                len,
                bytes.len() - FRAME_OVERHEAD
            )));
        }

        let payload = &bytes[6..6 + len];
        let sum = bytes[6 + len];
        let term = bytes[7 + len];
        if term != TERMINATOR {
            return Err(MxError::Decode(format!(
                "missing terminator, found {:02x}",
                term
            )));
        }
        let expected = checksum(payload, 0, len);
        if sum != expected {
            return Err(MxError::Decode(format!(
                "checksum mismatch: got {:02x}, expected {:02x}",
                sum, expected
            )));
        }

        Ok((Frame::new(command, payload.to_vec()), total))
    }
}

/// Serialize a sequence of frames into one contiguous byte stream.
pub fn frames_to_bytes(frames: &[Frame]) -> Vec<u8> {
    let total = frames.iter().map(Frame::encoded_len).sum();
    let mut out = Vec::with_capacity(total);
    for frame in frames {
        frame.write_to(&mut out);
    }
    out
}

// ============================================================================
// QUERIES
// ============================================================================

/// # Query Status (0xA3)
///
/// The printer answers with a notification whose byte 6 is the status
/// bitfield, see [`crate::protocol::status`].
pub fn get_status() -> Frame {
    Frame::new(CMD_GET_STATUS, vec![0x00])
}

/// # Query Serial Number (0xA8)
pub fn get_serial() -> Frame {
    Frame::new(CMD_GET_SERIAL, vec![0x00])
}

// ============================================================================
// SETTINGS
// ============================================================================

/// # Set Print Speed (0xF1)
///
/// One byte. Lower is faster: the presets use 1 (fast) to 3 (slow), while
/// the model default is 60.
pub fn set_speed(speed: u8) -> Frame {
    Frame::new(CMD_SET_SPEED, vec![speed])
}

/// # Set Concentration (0xF2)
///
/// Big-endian u16 density value.
pub fn set_concentration(value: u16) -> Frame {
    Frame::new(CMD_SET_CONCENTRATION, value.to_be_bytes().to_vec())
}

/// # Set Energy (0xAF)
///
/// Big-endian u16 heating energy used by the next print job. Takes effect
/// after [`apply_energy`].
///
/// ```
/// use mxprint::protocol::commands::set_energy;
///
/// let frame = set_energy(150);
/// assert_eq!(frame.payload, vec![0x00, 0x96]);
/// ```
pub fn set_energy(value: u16) -> Frame {
    Frame::new(CMD_SET_ENERGY, value.to_be_bytes().to_vec())
}

/// # Apply Energy (0xBE)
pub fn apply_energy() -> Frame {
    Frame::new(CMD_APPLY_ENERGY, vec![0x01])
}

/// # Set Quality (0xA4)
///
/// Always 200 DPI on this family.
pub fn set_quality() -> Frame {
    Frame::new(CMD_SET_QUALITY, vec![QUALITY_200_DPI])
}

// ============================================================================
// PAPER CONTROL
// ============================================================================

/// # Feed Paper (0xA1)
///
/// Advance by `lines` dot rows. Little-endian u16.
pub fn feed_paper(lines: u16) -> Frame {
    Frame::new(CMD_FEED_PAPER, lines.to_le_bytes().to_vec())
}

/// # Label Calibrate (0xF0)
///
/// Feeds to the next label gap. Only meaningful on label stock.
pub fn label_calibrate() -> Frame {
    Frame::new(CMD_LABEL_CALIBRATE, vec![0x00, 0x00, 0x00])
}

// ============================================================================
// RASTER
// ============================================================================

/// # Lattice Start (0xA6)
pub fn lattice_start() -> Frame {
    Frame::new(CMD_LATTICE, LATTICE_START.to_vec())
}

/// # Lattice End (0xA6)
pub fn lattice_end() -> Frame {
    Frame::new(CMD_LATTICE, LATTICE_END.to_vec())
}

/// # Print Row (0xBF / 0xA2)
///
/// The command byte follows the row encoding: 0xBF for run-length tokens,
/// 0xA2 for a packed bitmap.
pub fn print_row(row: EncodedRow) -> Frame {
    match row {
        EncodedRow::RunLength(tokens) => Frame::new(CMD_PRINT_ROW_RLE, tokens),
        EncodedRow::PackedBitmap(bytes) => Frame::new(CMD_PRINT_ROW_PACKED, bytes),
    }
}

// ============================================================================
// PRINT JOB
// ============================================================================

/// Per-job parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Heating energy sent with [`set_energy`]
    pub energy: u16,
    /// Lines fed after the raster, on top of the fixed trailing feed
    pub extra_feed: u16,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            energy: 0xFFFF,
            extra_feed: 0,
        }
    }
}

/// Build the full frame sequence for printing `raster`.
///
/// Rows are encoded in parallel; the output order always matches the
/// raster's row order.
///
/// ## Errors
///
/// - [`MxError::Validation`] if the raster is not exactly
///   [`PRINT_WIDTH`] dots wide, or a row holds a non-binary pixel.
pub fn print_job(raster: &Raster, settings: &JobSettings) -> Result<Vec<Frame>> {
    if raster.width() != PRINT_WIDTH {
        return Err(MxError::Validation(format!(
            "raster width must be {} dots, got {}",
            PRINT_WIDTH,
            raster.width()
        )));
    }

    let rows: Vec<Frame> = (0..raster.height())
        .into_par_iter()
        .map(|y| encode_row(raster.row(y)).map(print_row))
        .collect::<Result<_>>()?;

    let mut frames = Vec::with_capacity(rows.len() + 9);
    frames.push(get_status());
    frames.push(set_quality());
    frames.push(set_energy(settings.energy));
    frames.push(apply_energy());
    frames.push(lattice_start());
    frames.extend(rows);
    frames.push(feed_paper(
        JOB_TRAILING_FEED.saturating_add(settings.extra_feed),
    ));
    frames.push(lattice_end());
    frames.push(get_status());

    Ok(frames)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_status() {
        assert_eq!(
            get_status().to_bytes(),
            vec![0x51, 0x78, 0xA3, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn test_get_serial() {
        assert_eq!(
            get_serial().to_bytes(),
            vec![0x51, 0x78, 0xA8, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn test_set_quality() {
        assert_eq!(
            set_quality().to_bytes(),
            vec![0x51, 0x78, 0xA4, 0x00, 0x01, 0x00, 0x32, 0x9E, 0xFF]
        );
    }

    #[test]
    fn test_lattice_brackets() {
        let start = lattice_start().to_bytes();
        assert_eq!(&start[..6], &[0x51, 0x78, 0xA6, 0x00, 0x0B, 0x00]);
        assert_eq!(&start[17..], &[0xA1, 0xFF]);

        let end = lattice_end().to_bytes();
        assert_eq!(&end[17..], &[0x11, 0xFF]);
    }

    #[test]
    fn test_set_energy() {
        assert_eq!(
            set_energy(150).to_bytes(),
            vec![0x51, 0x78, 0xAF, 0x00, 0x02, 0x00, 0x00, 0x96, 0xEB, 0xFF]
        );
    }

    #[test]
    fn test_apply_energy() {
        assert_eq!(
            apply_energy().to_bytes(),
            vec![0x51, 0x78, 0xBE, 0x00, 0x01, 0x00, 0x01, 0x07, 0xFF]
        );
    }

    #[test]
    fn test_feed_paper_little_endian() {
        assert_eq!(
            feed_paper(8).to_bytes(),
            vec![0x51, 0x78, 0xA1, 0x00, 0x02, 0x00, 0x08, 0x00, 0xA8, 0xFF]
        );
        assert_eq!(feed_paper(0x0130).payload, vec![0x30, 0x01]);
    }

    #[test]
    fn test_set_concentration_big_endian() {
        let frame = set_concentration(0x1234);
        assert_eq!(frame.command, CMD_SET_CONCENTRATION);
        assert_eq!(frame.payload, vec![0x12, 0x34]);
    }

    #[test]
    fn test_set_speed() {
        let bytes = set_speed(60).to_bytes();
        assert_eq!(&bytes[..7], &[0x51, 0x78, 0xF1, 0x00, 0x01, 0x00, 60]);
        assert_eq!(bytes[7], checksum(&[60], 0, 1));
        assert_eq!(bytes[8], 0xFF);
    }

    #[test]
    fn test_label_calibrate() {
        let frame = label_calibrate();
        assert_eq!(frame.command, 0xF0);
        assert_eq!(frame.length_field(), 3);
        assert_eq!(frame.to_bytes().len(), 11);
    }

    #[test]
    fn test_print_row_command_follows_encoding() {
        let rle = print_row(EncodedRow::RunLength(vec![0x7F, 0x7F, 0x7F, 0x03]));
        assert_eq!(rle.command, CMD_PRINT_ROW_RLE);
        assert_eq!(
            rle.to_bytes(),
            vec![0x51, 0x78, 0xBF, 0x00, 0x04, 0x00, 0x7F, 0x7F, 0x7F, 0x03, rle.checksum(), 0xFF]
        );

        let packed = print_row(EncodedRow::PackedBitmap(vec![0xFF; 48]));
        assert_eq!(packed.command, CMD_PRINT_ROW_PACKED);
        assert_eq!(packed.checksum(), 0xE8);
        assert_eq!(packed.to_bytes().len(), 56);
    }

    #[test]
    fn test_length_field_matches_payload() {
        for frame in [
            get_status(),
            set_energy(1),
            feed_paper(3),
            lattice_start(),
            label_calibrate(),
            print_row(EncodedRow::PackedBitmap(vec![0xAA; 48])),
        ] {
            let bytes = frame.to_bytes();
            let len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
            assert_eq!(len, frame.payload.len());
            assert_eq!(bytes.len(), len + FRAME_OVERHEAD);
        }
    }

    #[test]
    fn test_parse_round_trip() {
        let frame = set_energy(0xBEEF);
        let bytes = frame.to_bytes();
        let (parsed, used) = Frame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let mut bytes = set_quality().to_bytes();
        bytes[6] = 0x33;
        assert!(matches!(Frame::parse(&bytes), Err(MxError::Decode(_))));

        let mut bytes = set_quality().to_bytes();
        bytes[0] = 0x00;
        assert!(matches!(Frame::parse(&bytes), Err(MxError::Decode(_))));

        let mut bytes = set_quality().to_bytes();
        *bytes.last_mut().unwrap() = 0x00;
        assert!(matches!(Frame::parse(&bytes), Err(MxError::Decode(_))));

        let bytes = lattice_start().to_bytes();
        assert!(matches!(Frame::parse(&bytes[..12]), Err(MxError::Decode(_))));
    }

    #[test]
    fn test_frames_to_bytes_concatenates() {
        let frames = vec![get_status(), set_quality()];
        let mut expected = get_status().to_bytes();
        expected.extend(set_quality().to_bytes());
        assert_eq!(frames_to_bytes(&frames), expected);
    }

    #[test]
    fn test_print_job_sequence() {
        let raster = Raster::new(PRINT_WIDTH, 3);
        let frames = print_job(
            &raster,
            &JobSettings {
                energy: 150,
                extra_feed: 12,
            },
        )
        .unwrap();

        let commands: Vec<u8> = frames.iter().map(|f| f.command).collect();
        assert_eq!(
            commands,
            vec![
                CMD_GET_STATUS,
                CMD_SET_QUALITY,
                CMD_SET_ENERGY,
                CMD_APPLY_ENERGY,
                CMD_LATTICE,
                CMD_PRINT_ROW_RLE,
                CMD_PRINT_ROW_RLE,
                CMD_PRINT_ROW_RLE,
                CMD_FEED_PAPER,
                CMD_LATTICE,
                CMD_GET_STATUS,
            ]
        );
        assert_eq!(frames[2].payload, vec![0x00, 0x96]);
        assert_eq!(frames[8].payload, vec![20, 0]);
        assert_eq!(frames[4].payload, LATTICE_START.to_vec());
        assert_eq!(frames[9].payload, LATTICE_END.to_vec());
    }

    #[test]
    fn test_print_job_preserves_row_order() {
        let mut raster = Raster::new(PRINT_WIDTH, 64);
        for y in 0..64 {
            raster.row_mut(y)[..y + 1].fill(1);
        }
        let frames = print_job(&raster, &JobSettings::default()).unwrap();
        for (y, frame) in frames[5..5 + 64].iter().enumerate() {
            assert_eq!(frame.payload[0], 0x80 | (y as u8 + 1));
        }
    }

    #[test]
    fn test_print_job_empty_raster() {
        let raster = Raster::new(PRINT_WIDTH, 0);
        let frames = print_job(&raster, &JobSettings::default()).unwrap();
        assert_eq!(frames.len(), 8);
    }

    #[test]
    fn test_print_job_rejects_wrong_width() {
        let raster = Raster::new(200, 4);
        let err = print_job(&raster, &JobSettings::default()).unwrap_err();
        assert!(matches!(err, MxError::Validation(_)));
    }
}
