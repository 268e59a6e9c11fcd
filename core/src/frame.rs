//! Frame assembly and candidate validation.
//!
//! Wire layout, bit-exact:
//!
//! ```text
//! [UW 48][payload: length*8 scrambled bits, byte-LSB-first][footer 46][UW 48]
//! ```
//!
//! Payload bytes are XORed with a fixed mask before bit serialization for DC
//! balance; the transform is its own inverse. The footer is the redundant
//! Golay-coded length (see [`crate::length`]). The same unique word closes
//! one frame and opens the next, so back-to-back frames on a channel share
//! it: when a previous frame's postamble is still queued, the new frame is
//! emitted without its leading unique word.

use crate::error::{BridgeError, Result};
use crate::{length, sync};
use crate::{FOOTER_BITS, MTU, SCRAMBLE_MASK, UW_BITS};

/// XOR a payload byte with the line-coding mask. Involution.
pub fn scramble(byte: u8) -> u8 {
    byte ^ SCRAMBLE_MASK
}

/// Wire bits for a payload of `len` bytes, including both unique words.
pub fn frame_bits(len: usize) -> usize {
    UW_BITS + len * 8 + FOOTER_BITS + UW_BITS
}

pub struct FrameEncoder;

impl FrameEncoder {
    /// Serialize a packet into its wire bit sequence.
    ///
    /// With `uw_pending` set, the leading unique word is elided: the caller
    /// still has the previous frame's postamble queued, and that doubles as
    /// this frame's preamble.
    pub fn encode(payload: &[u8], uw_pending: bool) -> Result<Vec<u8>> {
        if payload.len() > MTU {
            return Err(BridgeError::PayloadTooLarge(payload.len()));
        }

        let uw = sync::uw_pattern();
        let mut bits = Vec::with_capacity(frame_bits(payload.len()));

        if !uw_pending {
            bits.extend_from_slice(&uw);
        }
        for x in 0..payload.len() * 8 {
            bits.push((scramble(payload[x / 8]) >> (x % 8)) & 1);
        }
        bits.extend_from_slice(&length::footer_bits(payload.len() as u16));
        bits.extend_from_slice(&uw);

        Ok(bits)
    }
}

/// Why a unique-word candidate was not a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The two footer decodes landed on different lengths.
    LengthDisagreement { direct: u16, masked: u16 },
    /// Both decodes agreed on zero. Expected over idle filler, especially at
    /// stream start; never a false alarm worth reporting.
    IdleFiller,
    /// The agreed length reaches back past the start of the window.
    PayloadOutOfWindow,
}

/// Outcome of validating one unique-word candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Accepted(Vec<u8>),
    Rejected(RejectReason),
}

pub struct FrameDecoder;

impl FrameDecoder {
    /// Validate the candidate whose trailing unique word starts at `uw_pos`.
    ///
    /// The footer sits at a fixed offset behind the unique word; the payload
    /// immediately precedes the footer by `length * 8` bits. `bits` and
    /// `soft` are the same window in hard and soft form.
    pub fn decode(bits: &[u8], soft: &[f32], uw_pos: usize) -> DecodeOutcome {
        let footer_start = match uw_pos.checked_sub(FOOTER_BITS) {
            Some(start) => start,
            None => return DecodeOutcome::Rejected(RejectReason::PayloadOutOfWindow),
        };

        let pair = length::decode_footer(&soft[footer_start..uw_pos]);
        let len = match pair.agreed() {
            Some(len) => len,
            None => {
                return DecodeOutcome::Rejected(RejectReason::LengthDisagreement {
                    direct: pair.direct,
                    masked: pair.masked,
                })
            }
        };
        if len == 0 {
            return DecodeOutcome::Rejected(RejectReason::IdleFiller);
        }

        let payload_bits = len as usize * 8;
        let payload_start = match footer_start.checked_sub(payload_bits) {
            Some(start) => start,
            None => return DecodeOutcome::Rejected(RejectReason::PayloadOutOfWindow),
        };

        let mut packet = vec![0u8; len as usize];
        for x in 0..payload_bits {
            packet[x / 8] |= bits[payload_start + x] << (x % 8);
        }
        for byte in &mut packet {
            *byte = scramble(*byte);
        }

        DecodeOutcome::Accepted(packet)
    }
}
