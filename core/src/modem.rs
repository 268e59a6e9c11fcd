//! Modem collaborator interface.
//!
//! The modulator/demodulator is a black box behind [`Modem`]: it turns bits
//! into complex baseband samples and samples back into soft decisions plus a
//! signal-quality metric. The protocol core never looks inside it; the
//! receive worker and transmit scheduler only honor its per-call contracts
//! (`samples_needed`, `bits_per_call`).
//!
//! Soft-decision convention, used everywhere downstream: log-domain values
//! where negative means bit 1, positive means bit 0, and magnitude is
//! confidence.

use std::io::{self, Write};

use crate::error::{BridgeError, Result};

/// One interleaved in-phase/quadrature sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Iq {
    pub re: f32,
    pub im: f32,
}

/// Bit-level modulate/demodulate contract.
///
/// Implementations own all per-channel DSP state and are driven by exactly
/// one worker or scheduler, never shared.
pub trait Modem: Send {
    /// Samples the next `demodulate` call wants. May vary call to call.
    fn samples_needed(&self) -> usize;

    /// Samples each `modulate` call produces.
    fn samples_per_call(&self) -> usize;

    /// Bits consumed/produced per call.
    fn bits_per_call(&self) -> usize;

    /// Demodulate one call's samples into soft decisions.
    ///
    /// `samples` holds exactly `samples_needed()` entries; `soft_out` holds
    /// exactly `bits_per_call()` entries.
    fn demodulate(&mut self, samples: &[Iq], soft_out: &mut [f32]);

    /// Modulate one call's bits (values 0/1) into samples, nominal peak
    /// amplitude 2.0 per component.
    ///
    /// `bits` holds exactly `bits_per_call()` entries; `out` holds exactly
    /// `samples_per_call()` entries.
    fn modulate(&mut self, bits: &[u8], out: &mut [Iq]);

    /// Energy-per-bit to noise ratio estimate from the most recent
    /// `demodulate` call, in dB.
    fn ebno_db(&self) -> f32;
}

/// Serialization format for transmit sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16-bit little-endian interleaved I/Q; modulator output scaled by
    /// 16383 so the nominal 2.0 peak lands just inside i16 range.
    S16Le,
    /// 32-bit float interleaved I/Q; output halved to keep the peak at 1.0.
    F32,
}

impl SampleFormat {
    /// Map the configuration selector (1 = s16le, 2 = float) to a format.
    pub fn from_selector(selector: u32) -> Result<Self> {
        match selector {
            1 => Ok(SampleFormat::S16Le),
            2 => Ok(SampleFormat::F32),
            other => Err(BridgeError::InvalidConfig(format!(
                "sample format selector must be 1 or 2, not {}",
                other
            ))),
        }
    }

    /// Bytes one sample occupies on the wire.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16Le => 4,
            SampleFormat::F32 => 8,
        }
    }

    /// Serialize samples into `out` (cleared first) for the sink stream.
    pub fn serialize(&self, samples: &[Iq], out: &mut Vec<u8>) {
        out.clear();
        out.reserve(samples.len() * self.bytes_per_sample());
        match self {
            SampleFormat::S16Le => {
                for s in samples {
                    out.extend_from_slice(&((s.re * 16383.0) as i16).to_le_bytes());
                    out.extend_from_slice(&((s.im * 16383.0) as i16).to_le_bytes());
                }
            }
            SampleFormat::F32 => {
                for s in samples {
                    out.extend_from_slice(&(s.re / 2.0).to_le_bytes());
                    out.extend_from_slice(&(s.im / 2.0).to_le_bytes());
                }
            }
        }
    }

    /// Serialize and write one call's samples to a sink.
    pub fn write_samples(
        &self,
        samples: &[Iq],
        scratch: &mut Vec<u8>,
        sink: &mut impl Write,
    ) -> io::Result<()> {
        self.serialize(samples, scratch);
        sink.write_all(scratch)
    }
}

/// Diagnostic modem: one unit-amplitude sample per bit, no channel model.
///
/// Maps bit 1 to `re = -1.0` and bit 0 to `re = +1.0`, and demodulates by
/// reading the in-phase component straight back as the soft decision. Useful
/// for protocol-level tests and loopback experiments where the DSP chain is
/// not under scrutiny.
pub struct LoopbackModem {
    bits_per_call: usize,
}

impl LoopbackModem {
    pub fn new(bits_per_call: usize) -> Self {
        Self { bits_per_call }
    }
}

impl Modem for LoopbackModem {
    fn samples_needed(&self) -> usize {
        self.bits_per_call
    }

    fn samples_per_call(&self) -> usize {
        self.bits_per_call
    }

    fn bits_per_call(&self) -> usize {
        self.bits_per_call
    }

    fn demodulate(&mut self, samples: &[Iq], soft_out: &mut [f32]) {
        debug_assert_eq!(samples.len(), soft_out.len());
        for (soft, sample) in soft_out.iter_mut().zip(samples) {
            *soft = sample.re;
        }
    }

    fn modulate(&mut self, bits: &[u8], out: &mut [Iq]) {
        debug_assert_eq!(bits.len(), out.len());
        for (sample, &bit) in out.iter_mut().zip(bits) {
            *sample = Iq {
                re: if bit == 1 { -1.0 } else { 1.0 },
                im: 0.0,
            };
        }
    }

    fn ebno_db(&self) -> f32 {
        f32::INFINITY
    }
}
