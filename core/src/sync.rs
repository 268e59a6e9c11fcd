//! Unique-word synchronization.
//!
//! Frame boundaries are marked by a fixed 48-bit pattern derived from a short
//! ASCII tag, used identically as preamble and postamble. The receive path
//! locates it by sliding a pattern-length window across the soft-decision
//! stream and scoring a signed correlation at every offset.
//!
//! No acceptance threshold is applied here. The correlation peak is
//! provisional; real acceptance is deferred to the length-footer agreement
//! check, which keeps a single well-defined cost function instead of two
//! stacked thresholds.

use crate::{UW_BITS, UW_TAG};

/// Expand the ASCII tag into the 48-bit wire pattern, LSB-first per byte.
pub fn uw_pattern() -> [u8; UW_BITS] {
    let mut bits = [0u8; UW_BITS];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (UW_TAG[i / 8] >> (i % 8)) & 1;
    }
    bits
}

/// A provisional unique-word match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UwMatch {
    /// Offset of the pattern's first bit within the searched window.
    pub offset: usize,
    /// Correlation score at that offset.
    pub score: f32,
}

/// Soft-decision correlation search for the unique word.
///
/// Each pattern bit contributes its soft decision, sign-matched: a bit 1
/// adds `-soft` (soft decisions are negative for 1), a bit 0 adds `+soft`.
/// Returns the offset with the maximum sum, preferring the latest offset on
/// ties, or `None` when the window is shorter than the pattern.
pub fn correlate_soft(soft: &[f32]) -> Option<UwMatch> {
    if soft.len() < UW_BITS {
        return None;
    }
    let pattern = uw_pattern();

    let mut best = UwMatch {
        offset: 0,
        score: f32::NEG_INFINITY,
    };
    for offset in 0..=(soft.len() - UW_BITS) {
        let mut sum = 0.0f32;
        for (i, &bit) in pattern.iter().enumerate() {
            sum -= soft[offset + i] * (2.0 * bit as f32 - 1.0);
        }
        if sum >= best.score {
            best = UwMatch { offset, score: sum };
        }
    }
    Some(best)
}
