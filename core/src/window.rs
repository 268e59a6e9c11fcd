//! Sliding bit/soft-decision window.
//!
//! Each receive channel owns one window sized to hold a full frame's bit
//! length plus one demodulator call's worth of bits, so unique-word search,
//! footer decode, and payload extraction can span demodulator call
//! boundaries without losing continuity. The buffers are allocated once and
//! never reallocated; every push shifts the window left by exactly the
//! number of bits appended, and the discarded prefix is never re-examined.

/// Paired hard-bit / soft-decision sliding buffer.
pub struct BitWindow {
    bits: Vec<u8>,
    soft: Vec<f32>,
    history: usize,
    max_chunk: usize,
}

impl BitWindow {
    /// A zero-filled window retaining `history` bits across pushes and
    /// accepting chunks of up to `max_chunk` bits.
    pub fn new(history: usize, max_chunk: usize) -> Self {
        let capacity = history + max_chunk;
        Self {
            bits: vec![0u8; capacity],
            soft: vec![0.0f32; capacity],
            history,
            max_chunk,
        }
    }

    /// Append a chunk of soft decisions, shifting the window left by the
    /// chunk length. Hard bits are derived on the way in: negative soft
    /// means 1.
    ///
    /// Panics if the chunk exceeds the window's configured maximum.
    pub fn push(&mut self, soft_chunk: &[f32]) {
        let n = soft_chunk.len();
        assert!(n <= self.max_chunk, "chunk of {} bits exceeds window maximum {}", n, self.max_chunk);

        let capacity = self.soft.len();
        self.soft.copy_within(n.., 0);
        self.bits.copy_within(n.., 0);

        let tail = capacity - n;
        for (i, &s) in soft_chunk.iter().enumerate() {
            self.soft[tail + i] = s;
            self.bits[tail + i] = (s < 0.0) as u8;
        }
    }

    /// Zero out the oldest `n` positions, consuming an already-extracted
    /// frame so its unique word cannot fire twice.
    pub fn clear_prefix(&mut self, n: usize) {
        let n = n.min(self.soft.len());
        self.soft[..n].fill(0.0);
        self.bits[..n].fill(0);
    }

    pub fn hard(&self) -> &[u8] {
        &self.bits
    }

    pub fn soft(&self) -> &[f32] {
        &self.soft
    }

    pub fn history(&self) -> usize {
        self.history
    }

    pub fn len(&self) -> usize {
        self.soft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soft.is_empty()
    }
}
