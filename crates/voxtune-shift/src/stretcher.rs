//! Streaming pitch stretchers.
//!
//! [`PitchStretcher`] is the seam for an external high-quality engine; the
//! formant-aware path feeds it input and takes whatever output is ready.
//! [`SpectralStretcher`] is the built-in implementation.
//!
//! ## Algorithm Overview
//!
//! 1. **Analysis**: Hann-windowed STFT at 75% overlap
//! 2. **Phase Unwrapping**: per-bin instantaneous frequency from phase differences
//! 3. **Bin Shift**: output bin `j` reads magnitude and frequency from input
//!    bin `j / pitch_scale`, frequency scaled by `pitch_scale`
//! 4. **Envelope**: the shifted bins are divided by the source spectral
//!    envelope and multiplied by the envelope at `j / formant_scale`, so with
//!    `formant_scale == 1.0` the vocal-tract resonances stay where they were
//! 5. **Synthesis**: accumulated phases, IFFT, windowed overlap-add
//!
//! ## RT-Safety
//!
//! All buffers are pre-allocated. `process()` and `retrieve()` perform no
//! allocations.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Streaming pitch shifter with separate pitch and formant control.
///
/// Output lags input by [`latency_samples`](Self::latency_samples); callers
/// retrieve what is [`available`](Self::available) after each `process`.
pub trait PitchStretcher: Send {
    /// Pitch ratio applied to subsequent input (1.0 = unchanged).
    fn set_pitch_scale(&mut self, scale: f32);

    /// Formant ratio (1.0 = keep formants in place).
    fn set_formant_scale(&mut self, scale: f32);

    fn process(&mut self, input: &[f32]);

    /// Output samples ready to retrieve.
    fn available(&self) -> usize;

    /// Copy up to `output.len()` ready samples, returning how many were written.
    fn retrieve(&mut self, output: &mut [f32]) -> usize;

    fn reset(&mut self);

    fn latency_samples(&self) -> usize;
}

/// Default STFT size.
pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Analysis frames per FFT length.
const OVERLAP: usize = 4;

/// Sum of squared periodic Hann windows at 75% overlap.
const WINDOW_GAIN: f32 = 1.5;

/// Largest boost the envelope correction may apply to a bin.
const MAX_ENVELOPE_GAIN: f32 = 10.0;

/// Phase-vocoder [`PitchStretcher`] with spectral-envelope formant preservation.
pub struct SpectralStretcher {
    // Configuration
    fft_size: usize,
    hop: usize,
    num_bins: usize,
    envelope_half_width: usize,
    pitch_scale: f32,
    formant_scale: f32,

    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,

    // Pre-allocated buffers (RT-safe)
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    last_phase: Vec<f32>,
    phase_accumulator: Vec<f32>,
    magnitude: Vec<f32>,
    frequency: Vec<f32>,
    envelope: Vec<f32>,
    prefix: Vec<f32>,

    // Input/output FIFOs
    input_fifo: Vec<f32>,
    output_fifo: Vec<f32>,
    input_write_pos: usize,
    input_read_pos: usize,
    output_write_pos: usize,
    output_read_pos: usize,
}

impl SpectralStretcher {
    /// Create a stretcher with an FFT of `fft_size` (rounded up to a power of
    /// two, at least 256).
    pub fn new(fft_size: usize) -> Self {
        let size = fft_size.max(256).next_power_of_two();
        let hop = size / OVERLAP;
        let num_bins = size / 2 + 1;

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();

        Self {
            fft_size: size,
            hop,
            num_bins,
            envelope_half_width: (size / 128).max(2),
            pitch_scale: 1.0,
            formant_scale: 1.0,
            forward,
            inverse,
            window,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            last_phase: vec![0.0; num_bins],
            phase_accumulator: vec![0.0; num_bins],
            magnitude: vec![0.0; num_bins],
            frequency: vec![0.0; num_bins],
            envelope: vec![0.0; num_bins],
            prefix: vec![0.0; num_bins + 1],
            input_fifo: vec![0.0; size * 2],
            output_fifo: vec![0.0; size * 4],
            input_write_pos: 0,
            input_read_pos: 0,
            output_write_pos: 0,
            output_read_pos: 0,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }

    pub fn pitch_scale(&self) -> f32 {
        self.pitch_scale
    }

    pub fn formant_scale(&self) -> f32 {
        self.formant_scale
    }

    fn process_frame(&mut self) {
        let n = self.fft_size;
        let bins = self.num_bins;
        let fifo_len = self.input_fifo.len();
        let out_fifo_len = self.output_fifo.len();
        let expected_step = 2.0 * PI * self.hop as f32 / n as f32;

        // 1. Analysis
        for i in 0..n {
            let sample = self.input_fifo[(self.input_read_pos + i) % fifo_len];
            self.buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.input_read_pos += self.hop;
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        // 2. Instantaneous frequency as phase advance per hop
        for k in 0..bins {
            let magnitude = self.buffer[k].norm();
            let phase = self.buffer[k].arg();
            let expected = k as f32 * expected_step;
            let deviation = wrap_phase(phase - self.last_phase[k] - expected);
            self.last_phase[k] = phase;
            self.magnitude[k] = magnitude;
            self.frequency[k] = expected + deviation;
        }
        self.compute_envelope();

        // 3-4. Bin shift with envelope correction
        let preserve = self.formant_scale > 0.0 && self.formant_scale != self.pitch_scale;
        for j in 0..bins {
            let source = j as f32 / self.pitch_scale;
            let (magnitude, frequency) = match self.interpolate_bin(source) {
                Some((m, f)) => (m, f * self.pitch_scale),
                None => (0.0, 0.0),
            };

            let magnitude = if preserve && magnitude > 0.0 {
                let source_env = sample_curve(&self.envelope, source);
                let target_env = sample_curve(&self.envelope, j as f32 / self.formant_scale);
                let gain = if source_env > 1e-9 {
                    (target_env / source_env).min(MAX_ENVELOPE_GAIN)
                } else {
                    0.0
                };
                magnitude * gain
            } else {
                magnitude
            };

            self.phase_accumulator[j] = wrap_phase(self.phase_accumulator[j] + frequency);
            self.buffer[j] = Complex::from_polar(magnitude, self.phase_accumulator[j]);
        }

        // Conjugate symmetry for a real-valued output
        self.buffer[0].im = 0.0;
        self.buffer[bins - 1].im = 0.0;
        for j in 1..bins - 1 {
            self.buffer[n - j] = self.buffer[j].conj();
        }

        // 5. Synthesis and overlap-add
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / (n as f32 * WINDOW_GAIN);
        for i in 0..n {
            let sample = self.buffer[i].re * scale * self.window[i];
            self.output_fifo[(self.output_write_pos + i) % out_fifo_len] += sample;
        }

        // Clear the span the next frame's tail lands on
        let clear_start = self.output_write_pos + n;
        for i in 0..self.hop {
            self.output_fifo[(clear_start + i) % out_fifo_len] = 0.0;
        }
        self.output_write_pos += self.hop;
    }

    /// Magnitude and frequency at fractional bin `source`, `None` past Nyquist.
    fn interpolate_bin(&self, source: f32) -> Option<(f32, f32)> {
        let index = source as usize;
        if index >= self.num_bins {
            return None;
        }
        let next = (index + 1).min(self.num_bins - 1);
        let frac = source - index as f32;
        let magnitude = self.magnitude[index] + (self.magnitude[next] - self.magnitude[index]) * frac;
        let frequency = self.frequency[index] + (self.frequency[next] - self.frequency[index]) * frac;
        Some((magnitude, frequency))
    }

    /// Box-smoothed magnitude spectrum.
    fn compute_envelope(&mut self) {
        let bins = self.num_bins;
        self.prefix[0] = 0.0;
        for k in 0..bins {
            self.prefix[k + 1] = self.prefix[k] + self.magnitude[k];
        }
        let w = self.envelope_half_width;
        for k in 0..bins {
            let lo = k.saturating_sub(w);
            let hi = (k + w + 1).min(bins);
            self.envelope[k] = (self.prefix[hi] - self.prefix[lo]) / (hi - lo) as f32;
        }
    }

    #[cfg(test)]
    fn envelope(&self) -> &[f32] {
        &self.envelope
    }
}

impl PitchStretcher for SpectralStretcher {
    fn set_pitch_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.pitch_scale = scale;
        }
    }

    fn set_formant_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.formant_scale = scale;
        }
    }

    fn process(&mut self, input: &[f32]) {
        let fifo_len = self.input_fifo.len();
        for &sample in input {
            self.input_fifo[self.input_write_pos % fifo_len] = sample;
            self.input_write_pos += 1;
            if self.input_write_pos - self.input_read_pos >= self.fft_size {
                self.process_frame();
            }
        }
    }

    fn available(&self) -> usize {
        self.output_write_pos.saturating_sub(self.output_read_pos)
    }

    fn retrieve(&mut self, output: &mut [f32]) -> usize {
        let count = output.len().min(self.available());
        let fifo_len = self.output_fifo.len();
        for (i, sample) in output.iter_mut().take(count).enumerate() {
            *sample = self.output_fifo[(self.output_read_pos + i) % fifo_len];
        }
        self.output_read_pos += count;
        count
    }

    fn reset(&mut self) {
        self.buffer.fill(Complex::new(0.0, 0.0));
        self.last_phase.fill(0.0);
        self.phase_accumulator.fill(0.0);
        self.input_fifo.fill(0.0);
        self.output_fifo.fill(0.0);
        self.input_write_pos = 0;
        self.input_read_pos = 0;
        self.output_write_pos = 0;
        self.output_read_pos = 0;
    }

    fn latency_samples(&self) -> usize {
        self.fft_size - self.hop
    }
}

impl Default for SpectralStretcher {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

/// Linear interpolation into `curve`, clamped to its ends.
fn sample_curve(curve: &[f32], position: f32) -> f32 {
    let last = curve.len() - 1;
    if position >= last as f32 {
        return curve[last];
    }
    let index = position.max(0.0) as usize;
    let frac = position - index as f32;
    curve[index] + (curve[index + 1] - curve[index]) * frac
}

/// Wrap phase to [-PI, PI]
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - (phase / (2.0 * PI)).round() * 2.0 * PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f32 = 44100.0;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / SR).sin() * 0.5)
            .collect()
    }

    fn run(stretcher: &mut SpectralStretcher, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::new();
        let mut block = vec![0.0; 256];
        for chunk in input.chunks(256) {
            stretcher.process(chunk);
            let got = stretcher.retrieve(&mut block);
            output.extend_from_slice(&block[..got]);
        }
        output
    }

    fn crossing_frequency(samples: &[f32]) -> f32 {
        let crossings = samples
            .windows(2)
            .filter(|w| w[0] <= 0.0 && w[1] > 0.0)
            .count();
        crossings as f32 * SR / samples.len() as f32
    }

    #[test]
    fn test_creation() {
        let stretcher = SpectralStretcher::new(1000);
        assert_eq!(stretcher.fft_size(), 1024);
        assert_eq!(stretcher.hop_size(), 256);
        assert_eq!(stretcher.latency_samples(), 768);
        assert_eq!(SpectralStretcher::new(16).fft_size(), 256);
    }

    #[test]
    fn test_wrap_phase() {
        assert_relative_eq!(wrap_phase(0.0), 0.0);
        assert_relative_eq!(wrap_phase(3.0 * PI).abs(), PI, epsilon = 1e-4);
        assert_relative_eq!(wrap_phase(2.0 * PI + 0.5), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_output_lags_by_latency() {
        let mut stretcher = SpectralStretcher::new(1024);
        stretcher.process(&vec![0.1; 1023]);
        assert_eq!(stretcher.available(), 0);

        // The first full frame releases one hop
        stretcher.process(&[0.1]);
        assert_eq!(stretcher.available(), 256);

        stretcher.process(&vec![0.1; 256]);
        assert_eq!(stretcher.available(), 1280 - stretcher.latency_samples());
    }

    #[test]
    fn test_identity_reconstructs_input() {
        let mut stretcher = SpectralStretcher::new(1024);
        let input = sine(440.0, 8192);
        let output = run(&mut stretcher, &input);

        assert!(output.len() > 6000);
        // Skip the overlap-add fade-in
        for t in 1024..output.len() {
            assert_relative_eq!(output[t], input[t], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_pitch_shift_up_fifth() {
        let mut stretcher = SpectralStretcher::new(2048);
        stretcher.set_pitch_scale(1.5);
        // Formants follow the pitch: plain bin shift
        stretcher.set_formant_scale(1.5);
        let output = run(&mut stretcher, &sine(220.0, 44100));

        let measured = crossing_frequency(&output[4096..]);
        assert!(
            (measured - 330.0).abs() < 5.0,
            "Expected ~330 Hz, got {} Hz",
            measured
        );
    }

    #[test]
    fn test_formant_preserving_shift_keeps_pitch_change() {
        let mut stretcher = SpectralStretcher::new(2048);
        stretcher.set_pitch_scale(0.8);
        stretcher.set_formant_scale(1.0);
        let output = run(&mut stretcher, &sine(300.0, 44100));

        assert!(output.iter().all(|s| s.is_finite()));
        let measured = crossing_frequency(&output[4096..]);
        assert!(
            (measured - 240.0).abs() < 5.0,
            "Expected ~240 Hz, got {} Hz",
            measured
        );
    }

    #[test]
    fn test_envelope_is_smoothed_magnitude() {
        let mut stretcher = SpectralStretcher::new(1024);
        stretcher.process(&sine(1000.0, 1024));

        let peak_bin = (1000.0 * 1024.0 / SR).round() as usize;
        let envelope = stretcher.envelope();
        // Smoothing spreads the peak but keeps it the local maximum region
        assert!(envelope[peak_bin] > envelope[peak_bin + 40]);
        assert!(envelope[peak_bin] < stretcher.magnitude[peak_bin]);
    }

    #[test]
    fn test_invalid_scales_ignored() {
        let mut stretcher = SpectralStretcher::default();
        stretcher.set_pitch_scale(0.0);
        stretcher.set_formant_scale(f32::NAN);
        assert_eq!(stretcher.pitch_scale(), 1.0);
        assert_eq!(stretcher.formant_scale(), 1.0);
    }

    #[test]
    fn test_reset() {
        let mut stretcher = SpectralStretcher::new(1024);
        stretcher.process(&sine(440.0, 4096));
        assert!(stretcher.available() > 0);

        stretcher.reset();
        assert_eq!(stretcher.available(), 0);
        let mut out = [1.0; 8];
        assert_eq!(stretcher.retrieve(&mut out), 0);
    }
}
