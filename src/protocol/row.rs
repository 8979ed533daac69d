//! # Raster Row Encoding
//!
//! Each printed row travels in its own print-row frame. The printer accepts
//! two encodings, and the encoder picks whichever keeps the frame inside the
//! printer's size ceiling.
//!
//! ## Run-Length Tokens
//!
//! One byte per run. Bit 7 is the pixel value, bits 0-6 the run length:
//!
//! ```text
//! token = (value << 7) | run        run in 1..=127
//!
//! 200 black pixels, then 184 white:
//!   0xFF (black x127)  0xC9 (black x73)  0x7F (white x127)  0x39 (white x57)
//! ```
//!
//! Runs longer than 127 are split into several tokens.
//!
//! ## Packed Bitmap
//!
//! 8 pixels per byte, **LSB first** (bit 0 = leftmost pixel of the group).
//! Note this is the opposite of the StarPRNT-style MSB-first packing.
//!
//! ## Selection
//!
//! Run-length is used unless its token stream is longer than `width / 8`
//! bytes. A busy row (dithered photo, checkerboard) therefore never costs
//! more than the packed form: 48 bytes for the 384-dot head.

use crate::error::{MxError, Result};

/// Largest run a single token can carry.
pub const MAX_RUN: usize = 0x7f;

/// One encoded raster row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedRow {
    /// `(value << 7) | run` tokens
    RunLength(Vec<u8>),
    /// 8 pixels per byte, bit 0 = first pixel of the group
    PackedBitmap(Vec<u8>),
}

impl EncodedRow {
    /// The encoded bytes, as they go into the frame payload.
    pub fn bytes(&self) -> &[u8] {
        match self {
            EncodedRow::RunLength(tokens) => tokens,
            EncodedRow::PackedBitmap(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn is_run_length(&self) -> bool {
        matches!(self, EncodedRow::RunLength(_))
    }
}

/// Encode one row of binary pixels (1 = black, 0 = white).
///
/// ## Errors
///
/// Returns [`MxError::Validation`] if any pixel is not 0 or 1.
///
/// ## Example
///
/// ```
/// use mxprint::protocol::row::{encode_row, EncodedRow};
///
/// let mut row = vec![0u8; 384];
/// row[..10].fill(1);
/// assert_eq!(
///     encode_row(&row).unwrap(),
///     EncodedRow::RunLength(vec![0x8a, 0x7f, 0x7f, 0x78])
/// );
/// ```
pub fn encode_row(row: &[u8]) -> Result<EncodedRow> {
    if let Some((x, &v)) = row.iter().enumerate().find(|(_, v)| **v > 1) {
        return Err(MxError::Validation(format!(
            "pixel {} has non-binary value {}",
            x, v
        )));
    }

    if row.is_empty() {
        return Ok(EncodedRow::RunLength(vec![0x00]));
    }

    let tokens = run_length_encode(row);
    if tokens.len() > row.len() / 8 {
        Ok(EncodedRow::PackedBitmap(pack_bits(row)))
    } else {
        Ok(EncodedRow::RunLength(tokens))
    }
}

/// Run-length encode a row without the size check.
pub fn run_length_encode(row: &[u8]) -> Vec<u8> {
    let mut tokens = Vec::new();
    let mut iter = row.iter().copied();

    let Some(mut current) = iter.next() else {
        return tokens;
    };
    let mut count = 1usize;

    for value in iter {
        if value == current {
            count += 1;
        } else {
            push_run(&mut tokens, count, current);
            current = value;
            count = 1;
        }
    }
    push_run(&mut tokens, count, current);

    tokens
}

/// Emit one run, split into 127-pixel tokens.
fn push_run(tokens: &mut Vec<u8>, mut count: usize, value: u8) {
    let bit = (value & 1) << 7;
    while count > MAX_RUN {
        tokens.push(bit | MAX_RUN as u8);
        count -= MAX_RUN;
    }
    if count > 0 {
        tokens.push(bit | count as u8);
    }
}

/// Pack a row 8 pixels per byte, LSB first, zero padded.
///
/// ```
/// use mxprint::protocol::row::pack_bits;
///
/// assert_eq!(pack_bits(&[1, 0, 0, 0, 0, 0, 0, 0]), vec![0x01]);
/// assert_eq!(pack_bits(&[0, 0, 0, 0, 0, 0, 0, 1, 1]), vec![0x80, 0x01]);
/// ```
pub fn pack_bits(row: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; row.len().div_ceil(8)];
    for (i, &pixel) in row.iter().enumerate() {
        if pixel != 0 {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Reconstruct `width` pixels from an encoded row.
///
/// Run-length streams that describe fewer pixels are padded with white,
/// longer ones are truncated.
pub fn decode_row(encoded: &EncodedRow, width: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width);
    match encoded {
        EncodedRow::RunLength(tokens) => {
            for &token in tokens {
                let value = token >> 7;
                let run = (token & 0x7f) as usize;
                pixels.extend(std::iter::repeat_n(value, run));
            }
        }
        EncodedRow::PackedBitmap(bytes) => {
            for &byte in bytes {
                for bit in 0..8 {
                    pixels.push((byte >> bit) & 1);
                }
            }
        }
    }
    pixels.resize(width, 0);
    pixels
}

// ============================================================================
// TESTS
// ============================================================================
