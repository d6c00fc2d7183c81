//! Normalized autocorrelation pitch detector.
//!
//! The autocorrelation is computed through the FFT (Wiener-Khinchin):
//! `r(τ) = IFFT(|FFT(x·w)|²)`, zero-padded to avoid circular wrap. Each lag
//! is normalized by `r(0)` and divided by the autocorrelation of the Hann
//! taper itself (Boersma 1993), which removes the taper's downward slope so
//! a periodic signal scores close to 1.0 at every multiple of its period.
//! The first peak within 90% of the best one is taken, which keeps
//! period-doubled lags from winning.

use super::{parabolic_offset, Detection, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use crate::window::{floor_power_of_two, AnalysisWindow, WindowBank, MAX_WINDOW, MIN_WINDOW};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Fewest samples this detector accepts.
pub const MIN_SAMPLES: usize = MIN_WINDOW;

/// Normalized peak value required for a detection.
const DEFAULT_THRESHOLD: f32 = 0.3;

/// Peaks within this fraction of the global maximum compete on lag order.
const FIRST_PEAK_RATIO: f32 = 0.9;

/// Autocorrelation of a continuous Hann window at relative lag `x` in `[0, 1)`.
fn hann_autocorrelation(x: f32) -> f32 {
    let phase = 2.0 * PI * x;
    (1.0 - x) * (2.0 / 3.0 + phase.cos() / 3.0) + phase.sin() / (2.0 * PI)
}

pub struct AutocorrelationDetector {
    threshold: f32,
    max_window: usize,
    fft_size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,

    // Precomputed tapers and their autocorrelations, per power-of-two length
    tapers: WindowBank,
    taper_acf: Vec<Vec<f32>>,

    // Pre-allocated buffers
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    normalized: Vec<f32>,
}

impl AutocorrelationDetector {
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

        let tapers = WindowBank::hann(max_window);
        let mut taper_acf = Vec::new();
        let mut size = MIN_SAMPLES;
        while size <= max_window {
            taper_acf.push(
                (0..size / 2 + 2)
                    .map(|lag| hann_autocorrelation(lag as f32 / size as f32))
                    .collect(),
            );
            size *= 2;
        }

        Self {
            threshold: DEFAULT_THRESHOLD,
            max_window,
            fft_size,
            forward,
            inverse,
            tapers,
            taper_acf,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            normalized: vec![0.0; max_window / 2 + 2],
        }
    }

    /// Minimum normalized peak (0.05 - 0.95). Default 0.3.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.05, 0.95);
    }

    pub fn min_samples(&self) -> usize {
        MIN_SAMPLES
    }

    /// Detect the fundamental of the most recent power-of-two run of samples.
    pub fn detect(&mut self, window: &AnalysisWindow<'_>) -> Detection {
        let samples = window.samples();
        let n = floor_power_of_two(samples.len().min(self.max_window));
        if n < MIN_SAMPLES {
            return Detection::NONE;
        }
        let frame = &samples[samples.len() - n..];
        let sample_rate = window.sample_rate() as f32;

        let min_lag = ((sample_rate / MAX_FREQUENCY_HZ).floor() as usize).max(2);
        let max_lag = ((sample_rate / MIN_FREQUENCY_HZ).ceil() as usize).min(n / 2);
        if max_lag < min_lag + 2 {
            return Detection::NONE;
        }

        let acf_index = (n.trailing_zeros() - MIN_SAMPLES.trailing_zeros()) as usize;
        let (Some(taper), Some(taper_acf)) = (self.tapers.get(n), self.taper_acf.get(acf_index))
        else {
            return Detection::NONE;
        };

        // Windowed, mean-removed frame
        let mean = frame.iter().sum::<f32>() / n as f32;
        for ((slot, &x), &w) in self.buffer.iter_mut().zip(frame).zip(taper) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        self.buffer[n..].fill(Complex::new(0.0, 0.0));

        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        for c in self.buffer.iter_mut() {
            *c = Complex::new(c.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let r0 = self.buffer[0].re;
        if r0 <= f32::EPSILON * self.fft_size as f32 {
            return Detection::NONE;
        }

        for lag in min_lag - 1..=max_lag + 1 {
            self.normalized[lag] = (self.buffer[lag].re / r0) / taper_acf[lag];
        }

        let nm = &self.normalized;
        let is_peak = |lag: usize| nm[lag] > nm[lag - 1] && nm[lag] >= nm[lag + 1];

        let global = (min_lag..=max_lag)
            .filter(|&lag| is_peak(lag))
            .map(|lag| nm[lag])
            .fold(f32::MIN, f32::max);
        if global < self.threshold {
            return Detection::NONE;
        }

        let Some(peak) =
            (min_lag..=max_lag).find(|&lag| is_peak(lag) && nm[lag] >= FIRST_PEAK_RATIO * global)
        else {
            return Detection::NONE;
        };

        let refined = peak as f32 + parabolic_offset(nm[peak - 1], nm[peak], nm[peak + 1]);

        Detection {
            frequency: sample_rate / refined,
            confidence: nm[peak].clamp(0.0, 1.0),
        }
    }
}

impl Default for AutocorrelationDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::test_signals::{error_percent, generate_sine, generate_voice};

    #[test]
    fn test_detect_220_sine() {
        let sr = 44100.0;
        let samples = generate_sine(sr, 220.0, 2048);
        let mut detector = AutocorrelationDetector::new();

        let result = detector.detect(&AnalysisWindow::new(&samples, sr));

        assert!(result.is_valid());
        assert!(
            error_percent(result.frequency, 220.0) < 1.0,
            "Expected 220 Hz, got {} Hz",
            result.frequency
        );
        assert!(result.confidence > DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_detect_vocal_range() {
        let sr = 44100.0;
        let mut detector = AutocorrelationDetector::new();

        for &freq in &[82.4, 110.0, 196.0, 330.0, 523.3, 700.0] {
            let samples = generate_sine(sr, freq, 2048);
            let result = detector.detect(&AnalysisWindow::new(&samples, sr));
            assert!(
                error_percent(result.frequency, freq) < 1.0,
                "Expected {} Hz, got {} Hz",
                freq,
                result.frequency
            );
        }
    }

    #[test]
    fn test_harmonic_rich_signal_no_octave_error() {
        let sr = 48000.0;
        let samples = generate_voice(sr, 150.0, 2048);
        let mut detector = AutocorrelationDetector::new();

        let result = detector.detect(&AnalysisWindow::new(&samples, sr));
        assert!(
            error_percent(result.frequency, 150.0) < 1.0,
            "got {} Hz",
            result.frequency
        );
    }

    #[test]
    fn test_silence() {
        let samples = vec![0.0; 1024];
        let mut detector = AutocorrelationDetector::new();
        let result = detector.detect(&AnalysisWindow::new(&samples, 44100.0));
        assert_eq!(result, Detection::NONE);
    }

    #[test]
    fn test_short_window() {
        let samples = generate_sine(44100.0, 440.0, 63);
        let mut detector = AutocorrelationDetector::new();
        let result = detector.detect(&AnalysisWindow::new(&samples, 44100.0));
        assert_eq!(result, Detection::NONE);
    }

    #[test]
    fn test_taper_acf_shape() {
        assert!((hann_autocorrelation(0.0) - 1.0).abs() < 1e-6);
        assert!(hann_autocorrelation(0.25) < 1.0);
        assert!(hann_autocorrelation(0.5) > 0.0);
    }
}
