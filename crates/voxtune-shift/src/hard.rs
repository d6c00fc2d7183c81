//! Hard pitch quantization: a two-tap delay-line shifter with sinc taps.
//!
//! Input is written into a persistent history ring. Two read taps sit half a
//! sweep apart inside a delay window of length `L` (25 ms). A phase
//! accumulator advancing by `(1 - ratio) / L` per sample moves both taps, so
//! the delay changes at the rate that transposes the signal by `ratio`. Each
//! tap wraps once per sweep; the taps are crossfaded with complementary
//! `sin²`/`cos²` gains so a tap is silent at the moment it wraps.
//!
//! Taps read fractional positions through a 17-point Hamming-windowed sinc
//! interpolator. The minimum delay keeps every interpolation point on samples
//! that have already been written, across block boundaries.

use std::f32::consts::PI;
use voxtune_core::{Error, Result};

/// Kernel half-width in samples.
pub const SINC_HALF_WIDTH: usize = 8;

const KERNEL_LEN: usize = 2 * SINC_HALF_WIDTH + 1;

/// Sweep length of the delay window.
pub const SWEEP_SECONDS: f64 = 0.025;

/// Delay of the newest tap position, past the kernel's reach.
const MIN_DELAY: f32 = (SINC_HALF_WIDTH + 2) as f32;

#[derive(Debug, Clone)]
pub struct HardQuantizer {
    ring: Vec<f32>,
    mask: usize,
    written: usize,
    phase: f32,
    sweep: f32,
    kernel_window: [f32; KERNEL_LEN],
    sample_rate: f64,
}

impl HardQuantizer {
    pub fn new(sample_rate: f64) -> Result<Self> {
        let mut quantizer = Self {
            ring: Vec::new(),
            mask: 0,
            written: 0,
            phase: 0.0,
            sweep: 1.0,
            kernel_window: hamming_window(),
            sample_rate,
        };
        quantizer.set_sample_rate(sample_rate)?;
        Ok(quantizer)
    }

    /// Resize the ring for a new sample rate and clear state. Not real-time safe.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        let sweep = (sample_rate * SWEEP_SECONDS).round().max(1.0) as usize;
        let capacity = (sweep + MIN_DELAY as usize + KERNEL_LEN + 2).next_power_of_two();

        self.ring = vec![0.0; capacity];
        self.mask = capacity - 1;
        self.sweep = sweep as f32;
        self.sample_rate = sample_rate;
        self.reset();
        Ok(())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Delay window length in samples.
    pub fn sweep_samples(&self) -> usize {
        self.sweep as usize
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Samples written since the last reset.
    pub fn samples_written(&self) -> usize {
        self.written
    }

    /// Clear history and phase.
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.written = 0;
        self.phase = 0.0;
    }

    /// Record `block` into the history without changing it.
    pub fn observe(&mut self, block: &[f32]) {
        for &sample in block {
            self.push(sample);
        }
    }

    /// Shift `block` by `ratio` in place, mixing `speed` (0.0 - 1.0) of the
    /// shifted signal with the dry input.
    pub fn process(&mut self, block: &mut [f32], ratio: f32, speed: f32) {
        if !ratio.is_finite() || ratio <= 0.0 {
            self.observe(block);
            return;
        }
        let speed = speed.clamp(0.0, 1.0);
        let step = (1.0 - ratio) / self.sweep;

        for sample in block.iter_mut() {
            let dry = *sample;
            self.push(dry);

            let phase_b = (self.phase + 0.5).fract();
            let tap_a = self.read(MIN_DELAY + self.phase * self.sweep);
            let tap_b = self.read(MIN_DELAY + phase_b * self.sweep);

            let gain = (PI * self.phase).sin();
            let gain_a = gain * gain;
            let result = tap_a * gain_a + tap_b * (1.0 - gain_a);

            *sample = result * speed + dry * (1.0 - speed);
            self.phase = (self.phase + step).rem_euclid(1.0);
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) {
        self.ring[self.written & self.mask] = sample;
        self.written = self.written.wrapping_add(1);
    }

    /// Interpolated sample `delay` samples behind the newest one.
    fn read(&self, delay: f32) -> f32 {
        // Position relative to the newest sample, which sits at written - 1
        let position = (self.written as f64 - 1.0) - delay as f64;
        if position < SINC_HALF_WIDTH as f64 {
            return 0.0;
        }
        let base = position.floor();
        let frac = (position - base) as f32;
        let base = base as usize;

        if frac < 1e-6 {
            return self.ring[base & self.mask];
        }

        // sinc(frac - k) = sin(π·frac)·(-1)^k / (π·(frac - k))
        let sin_frac = (PI * frac).sin();
        let mut sum = 0.0;
        for (j, &window) in self.kernel_window.iter().enumerate() {
            let k = j as isize - SINC_HALF_WIDTH as isize;
            let x = frac - k as f32;
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            let sinc = sign * sin_frac / (PI * x);
            let index = (base as isize + k) as usize & self.mask;
            sum += self.ring[index] * sinc * window;
        }
        sum
    }
}

fn hamming_window() -> [f32; KERNEL_LEN] {
    let mut window = [0.0; KERNEL_LEN];
    let span = (KERNEL_LEN - 1) as f32;
    for (j, w) in window.iter_mut().enumerate() {
        *w = 0.54 - 0.46 * (2.0 * PI * j as f32 / span).cos();
    }
    window
}
