//! YIN pitch detector (de Cheveigné & Kawahara, 2002).
//!
//! 1. **Difference function** `d(τ) = Σ(x[j] - x[j+τ])²` over the first half of the window
//! 2. **Cumulative mean normalization** `d'(τ) = d(τ) · τ / Σ d(1..=τ)`
//! 3. **Absolute threshold**: first τ with `d'(τ) < 0.1`, then descend to its local minimum
//! 4. **Parabolic interpolation** for sub-sample accuracy
//!
//! The difference function uses the identity
//! `d(τ) = e(0) + e(τ) - 2·c(τ)` where `e` are window energies from a
//! running sum of squares and `c(τ)` is the cross-correlation of the first
//! half-window with the whole window, computed with one FFT round trip.

use super::{parabolic_offset, Detection, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use crate::window::{floor_power_of_two, AnalysisWindow, MAX_WINDOW};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Fewest samples this detector accepts.
pub const MIN_SAMPLES: usize = 128;

/// Default absolute threshold on `d'(τ)`.
const DEFAULT_THRESHOLD: f32 = 0.1;

pub struct YinDetector {
    threshold: f32,
    max_window: usize,
    fft_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,

    // Pre-allocated buffers
    signal: Vec<Complex<f32>>,
    head: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    cum_sq: Vec<f64>,
    difference: Vec<f32>,
    cumulative_mean: Vec<f32>,
}

impl YinDetector {
    pub fn new() -> Self {
        Self::with_max_window(MAX_WINDOW)
    }

    /// Size all buffers for windows up to `max_window` samples.
    pub fn with_max_window(max_window: usize) -> Self {
        let max_window = floor_power_of_two(max_window.max(MIN_SAMPLES));
        let fft_size = 2 * max_window;

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            threshold: DEFAULT_THRESHOLD,
            max_window,
            fft_size,
            forward,
            inverse,
            signal: vec![Complex::new(0.0, 0.0); fft_size],
            head: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            cum_sq: vec![0.0; max_window + 1],
            difference: vec![0.0; max_window / 2 + 1],
            cumulative_mean: vec![1.0; max_window / 2 + 1],
        }
    }

    /// Set YIN threshold (0.01 - 0.5)
    ///
    /// Lower values are stricter and may miss breathy notes.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.01, 0.5);
    }

    pub fn min_samples(&self) -> usize {
        MIN_SAMPLES
    }

    pub fn detect(&mut self, window: &AnalysisWindow<'_>) -> Detection {
        let samples = window.samples();
        let n = floor_power_of_two(samples.len().min(self.max_window));
        if n < MIN_SAMPLES {
            return Detection::NONE;
        }
        let frame = &samples[samples.len() - n..];
        let sample_rate = window.sample_rate() as f32;
        let half = n / 2;

        let min_period = ((sample_rate / MAX_FREQUENCY_HZ).floor() as usize).max(2);
        let max_period = ((sample_rate / MIN_FREQUENCY_HZ).ceil() as usize).min(half);
        if max_period < min_period + 2 {
            return Detection::NONE;
        }

        self.compute_difference(frame, max_period);
        self.compute_cumulative_mean(max_period);

        let Some(period) = self.find_period(min_period, max_period) else {
            return Detection::NONE;
        };

        let refined = if period < max_period {
            period as f32
                + parabolic_offset(
                    self.cumulative_mean[period - 1],
                    self.cumulative_mean[period],
                    self.cumulative_mean[period + 1],
                )
        } else {
            period as f32
        };

        Detection {
            frequency: sample_rate / refined,
            confidence: (1.0 - self.cumulative_mean[period]).clamp(0.0, 1.0),
        }
    }

    /// Steps 1-2: `d(τ) = e(0, W) + e(τ, W) - 2·c(τ)` for `τ` in `0..=max_period`.
    fn compute_difference(&mut self, frame: &[f32], max_period: usize) {
        let n = frame.len();
        let width = n / 2;

        for (i, &x) in frame.iter().enumerate() {
            self.cum_sq[i + 1] = self.cum_sq[i] + (x as f64) * (x as f64);
        }
        let energy = |cum_sq: &[f64], start: usize| cum_sq[start + width] - cum_sq[start];

        // c(τ) = Σ head[j]·x[j+τ] = IFFT(conj(H)·X)[τ]
        for (i, slot) in self.signal.iter_mut().enumerate() {
            *slot = Complex::new(if i < n { frame[i] } else { 0.0 }, 0.0);
        }
        for (i, slot) in self.head.iter_mut().enumerate() {
            *slot = Complex::new(if i < width { frame[i] } else { 0.0 }, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.signal, &mut self.scratch);
        self.forward
            .process_with_scratch(&mut self.head, &mut self.scratch);
        for (s, h) in self.signal.iter_mut().zip(&self.head) {
            *s = h.conj() * *s;
        }
        self.inverse
            .process_with_scratch(&mut self.signal, &mut self.scratch);

        let norm = 1.0 / self.fft_size as f64;
        let e0 = energy(&self.cum_sq, 0);
        self.difference[0] = 0.0;
        for tau in 1..=max_period {
            let cross = self.signal[tau].re as f64 * norm;
            let d = e0 + energy(&self.cum_sq, tau) - 2.0 * cross;
            self.difference[tau] = d.max(0.0) as f32;
        }
    }

    /// Step 3: cumulative mean normalized difference, `d'(0) = 1`.
    fn compute_cumulative_mean(&mut self, max_period: usize) {
        self.cumulative_mean[0] = 1.0;

        let mut running_sum = 0.0f32;
        for tau in 1..=max_period {
            running_sum += self.difference[tau];
            self.cumulative_mean[tau] = if running_sum > 1e-10 {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    /// Step 4: the first dip below threshold, walked down to its local minimum.
    ///
    /// Taking the first dip rather than the global minimum avoids
    /// subharmonic (octave-down) errors.
    fn find_period(&self, min_period: usize, max_period: usize) -> Option<usize> {
        let cm = &self.cumulative_mean;
        let mut tau = (min_period..=max_period).find(|&t| cm[t] < self.threshold)?;
        while tau < max_period && cm[tau + 1] < cm[tau] {
            tau += 1;
        }
        Some(tau)
    }
}

impl Default for YinDetector {
    fn default() -> Self {
        Self::new()
    }
}
