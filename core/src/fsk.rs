//! Non-coherent 2FSK modem.
//!
//! Bit 0 rides the space tone at `tone_hz`, bit 1 the mark tone one symbol
//! rate above it. Modulation is phase-continuous tone synthesis at complex
//! baseband; demodulation correlates each symbol window against both tones
//! and emits the log tone-energy ratio as the soft decision, so no carrier
//! phase recovery is needed. The demodulator assumes symbol-aligned input at
//! a fixed per-call sample count.

use std::f32::consts::TAU;

use crate::error::{BridgeError, Result};
use crate::modem::{Iq, Modem};

/// Symbols per modulate/demodulate call when the caller has no preference.
pub const DEFAULT_SYMBOLS_PER_CALL: usize = 50;

/// Nominal peak amplitude per output component.
const TX_AMPLITUDE: f32 = 2.0;

/// Guard against log-of-zero on dead input.
const ENERGY_EPSILON: f32 = 1e-12;

/// 2FSK channel parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FskParams {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Symbol rate in baud. The mark tone sits one symbol rate above space.
    pub symbol_rate: u32,
    /// Samples per symbol; must equal `sample_rate / symbol_rate`.
    pub oversample: u32,
    /// Space-tone frequency in Hz.
    pub tone_hz: f32,
    /// Symbols handled per call.
    pub symbols_per_call: usize,
}

impl FskParams {
    pub fn validate(&self) -> Result<()> {
        if self.symbol_rate == 0 || self.sample_rate == 0 {
            return Err(BridgeError::InvalidConfig(
                "sample and symbol rates must be non-zero".into(),
            ));
        }
        if self.sample_rate != self.symbol_rate * self.oversample {
            return Err(BridgeError::InvalidConfig(format!(
                "sample rate {} must equal symbol rate {} times oversample {}",
                self.sample_rate, self.symbol_rate, self.oversample
            )));
        }
        if self.oversample < 2 {
            return Err(BridgeError::InvalidConfig(
                "oversample must be at least 2".into(),
            ));
        }
        let mark = self.tone_hz + self.symbol_rate as f32;
        if self.tone_hz <= 0.0 || mark > self.sample_rate as f32 / 2.0 {
            return Err(BridgeError::InvalidConfig(format!(
                "tones {}..{} Hz do not fit below half the {} Hz sample rate",
                self.tone_hz, mark, self.sample_rate
            )));
        }
        if self.symbols_per_call == 0 {
            return Err(BridgeError::InvalidConfig(
                "symbols per call must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

pub struct FskModem {
    params: FskParams,
    samples_per_symbol: usize,
    /// Transmit phase accumulator, radians. Carries across calls so tone
    /// transitions stay continuous.
    phase: f32,
    ebno_db: f32,
}

impl FskModem {
    pub fn new(params: FskParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            samples_per_symbol: params.oversample as usize,
            phase: 0.0,
            ebno_db: 0.0,
        })
    }

    fn tone_freq(&self, bit: u8) -> f32 {
        self.params.tone_hz + bit as f32 * self.params.symbol_rate as f32
    }

    /// Complex correlation energy of one symbol window against a tone.
    fn tone_energy(&self, window: &[Iq], freq: f32) -> f32 {
        let step = TAU * freq / self.params.sample_rate as f32;
        let mut acc_re = 0.0f32;
        let mut acc_im = 0.0f32;
        for (n, s) in window.iter().enumerate() {
            let angle = step * n as f32;
            let (sin, cos) = angle.sin_cos();
            // x[n] * conj(e^{j angle})
            acc_re += s.re * cos + s.im * sin;
            acc_im += s.im * cos - s.re * sin;
        }
        acc_re * acc_re + acc_im * acc_im
    }
}

impl Modem for FskModem {
    fn samples_needed(&self) -> usize {
        self.params.symbols_per_call * self.samples_per_symbol
    }

    fn samples_per_call(&self) -> usize {
        self.params.symbols_per_call * self.samples_per_symbol
    }

    fn bits_per_call(&self) -> usize {
        self.params.symbols_per_call
    }

    fn demodulate(&mut self, samples: &[Iq], soft_out: &mut [f32]) {
        debug_assert_eq!(samples.len(), self.samples_needed());
        debug_assert_eq!(soft_out.len(), self.bits_per_call());

        let space = self.tone_freq(0);
        let mark = self.tone_freq(1);
        let mut ratio_sum = 0.0f32;

        for (symbol, soft) in soft_out.iter_mut().enumerate() {
            let start = symbol * self.samples_per_symbol;
            let window = &samples[start..start + self.samples_per_symbol];
            let e_space = self.tone_energy(window, space);
            let e_mark = self.tone_energy(window, mark);

            *soft = ((e_space + ENERGY_EPSILON) / (e_mark + ENERGY_EPSILON)).ln();

            let (win, lose) = if e_space > e_mark {
                (e_space, e_mark)
            } else {
                (e_mark, e_space)
            };
            ratio_sum += (win + ENERGY_EPSILON) / (lose + ENERGY_EPSILON);
        }

        // Tone discrimination ratio in dB, a serviceable EbNo stand-in.
        let mean_ratio = ratio_sum / soft_out.len() as f32;
        self.ebno_db = 10.0 * mean_ratio.log10();
    }

    fn modulate(&mut self, bits: &[u8], out: &mut [Iq]) {
        debug_assert_eq!(bits.len(), self.bits_per_call());
        debug_assert_eq!(out.len(), self.samples_per_call());

        for (symbol, &bit) in bits.iter().enumerate() {
            let step = TAU * self.tone_freq(bit) / self.params.sample_rate as f32;
            let start = symbol * self.samples_per_symbol;
            for sample in &mut out[start..start + self.samples_per_symbol] {
                self.phase += step;
                let (sin, cos) = self.phase.sin_cos();
                *sample = Iq {
                    re: TX_AMPLITUDE * cos,
                    im: TX_AMPLITUDE * sin,
                };
            }
            self.phase = self.phase.rem_euclid(TAU);
        }
    }

    fn ebno_db(&self) -> f32 {
        self.ebno_db
    }
}
