//! Built-in harmonic-plus-noise synthesizer.

use crate::error::{AiError, Result};
use crate::model::{HarmonicSynthesizer, SynthesisParams};
use std::f32::consts::TAU;

/// Noise contribution relative to its envelope value.
const NOISE_SCALE: f32 = 0.1;

/// Additive synthesizer with a phase-continuous fundamental.
///
/// Harmonic `h` runs at `h` times the fundamental phase, so consecutive
/// blocks join without clicks even when the fundamental changes. Harmonic
/// amplitudes are normalized by their sum, making `loudness` the peak level
/// of the harmonic part. Output is clamped to ±1.
#[derive(Debug, Clone)]
pub struct AdditiveSynthesizer {
    phase: f32,
    noise_state: u32,
}

impl AdditiveSynthesizer {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            noise_state: 0x9E37_79B9,
        }
    }

    /// Fundamental phase in cycles, `[0, 1)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Uniform noise in `[-1, 1)` from a xorshift generator.
    #[inline]
    fn next_noise(&mut self) -> f32 {
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

impl Default for AdditiveSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl HarmonicSynthesizer for AdditiveSynthesizer {
    fn synthesize(
        &mut self,
        params: &SynthesisParams,
        out: &mut [f32],
        sample_rate: f32,
    ) -> Result<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AiError::processing(format!(
                "invalid sample rate {}",
                sample_rate
            )));
        }
        out.fill(0.0);
        if params.fundamental_freq <= 0.0 || out.is_empty() {
            return Ok(());
        }

        let nyquist = sample_rate * 0.5;
        let audible = ((nyquist / params.fundamental_freq) as usize)
            .min(params.harmonic_amplitudes.len());
        let amplitudes = &params.harmonic_amplitudes[..audible];
        let total: f32 = amplitudes.iter().map(|a| a.abs()).sum();
        let norm = if total > 0.0 { 1.0 / total } else { 0.0 };
        let increment = params.fundamental_freq / sample_rate;

        for (i, sample) in out.iter_mut().enumerate() {
            let mut value = 0.0;
            for (h, &amplitude) in amplitudes.iter().enumerate() {
                value += amplitude * (TAU * self.phase * (h + 1) as f32).sin();
            }
            value *= norm;

            if !params.noise_level.is_empty() {
                let level = params.noise_level[i % params.noise_level.len()];
                value += self.next_noise() * level * NOISE_SCALE;
            }

            *sample = (value * params.loudness).clamp(-1.0, 1.0);
            self.phase = (self.phase + increment).fract();
        }
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
