//! Windowed magnitude spectra and formant peak-picking.
//!
//! One [`SpectralAnalyzer`] feeds both spectral pitch detectors and the
//! formant tracker, so the FFT runs at most once per analysis hop.
//!
//! Frames are Hann-tapered and zero-padded by [`ZERO_PAD`] before the FFT.
//! Magnitudes are scaled so a full-scale sine peaks near 1.0 regardless of
//! frame size.

use crate::window::hann;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Zero-padding factor applied to each analysis frame.
pub const ZERO_PAD: usize = 4;

/// Frame sizes with a prepared FFT plan.
pub const FRAME_SIZES: [usize; 3] = [1024, 2048, 4096];

/// Maximum number of formants reported per hop.
pub const MAX_FORMANTS: usize = 5;

/// Formant search band in Hz.
pub const FORMANT_MIN_HZ: f32 = 200.0;
pub const FORMANT_MAX_HZ: f32 = 4000.0;

/// Half-width of the local-maximum test, in unpadded bins.
const FORMANT_NEIGHBOURHOOD: usize = 2;

/// Peaks quieter than this are ignored.
const FORMANT_FLOOR: f32 = 1e-4;

/// One vocal-tract resonance peak.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Formant {
    pub frequency: f32,
    pub amplitude: f32,
}

/// Up to five formants, strongest first.
///
/// Overwritten in full on every detection; nothing carries over.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FormantSet {
    peaks: [Formant; MAX_FORMANTS],
    len: usize,
}

impl FormantSet {
    pub fn as_slice(&self) -> &[Formant] {
        &self.peaks[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.peaks = [Formant::default(); MAX_FORMANTS];
        self.len = 0;
    }

    /// Insert keeping amplitude-descending order, dropping the weakest on overflow.
    fn insert(&mut self, formant: Formant) {
        let mut pos = self.len;
        while pos > 0 && self.peaks[pos - 1].amplitude < formant.amplitude {
            pos -= 1;
        }
        if pos >= MAX_FORMANTS {
            return;
        }
        let end = self.len.min(MAX_FORMANTS - 1);
        for i in (pos..end).rev() {
            self.peaks[i + 1] = self.peaks[i];
        }
        self.peaks[pos] = formant;
        self.len = (self.len + 1).min(MAX_FORMANTS);
    }
}

struct FramePlan {
    frame_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_sum: f32,
}

/// FFT magnitude spectrum with pre-planned transforms for every supported frame size.
pub struct SpectralAnalyzer {
    sample_rate: f64,
    plans: Vec<FramePlan>,
    active: usize,

    // Pre-allocated for the largest plan
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    num_bins: usize,

    formants: FormantSet,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: f64, frame_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let plans: Vec<FramePlan> = FRAME_SIZES
            .iter()
            .map(|&frame_size| {
                let window = hann(frame_size);
                let window_sum = window.iter().sum();
                FramePlan {
                    frame_size,
                    fft: planner.plan_fft_forward(frame_size * ZERO_PAD),
                    window,
                    window_sum,
                }
            })
            .collect();

        let max_fft = FRAME_SIZES[FRAME_SIZES.len() - 1] * ZERO_PAD;
        let scratch_len = plans
            .iter()
            .map(|p| p.fft.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        let mut analyzer = Self {
            sample_rate,
            plans,
            active: 0,
            buffer: vec![Complex::new(0.0, 0.0); max_fft],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; max_fft / 2 + 1],
            num_bins: 0,
            formants: FormantSet::default(),
        };
        analyzer.set_frame_size(frame_size);
        analyzer
    }

    /// Select the largest supported frame not exceeding `size` (smallest if none).
    ///
    /// Never allocates; clears the current spectrum.
    pub fn set_frame_size(&mut self, size: usize) {
        self.active = self
            .plans
            .iter()
            .rposition(|p| p.frame_size <= size)
            .unwrap_or(0);
        self.num_bins = 0;
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.plans[self.active].frame_size
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.frame_size() * ZERO_PAD
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.num_bins = 0;
    }

    /// Width of one (padded) bin in Hz.
    #[inline]
    pub fn bin_width(&self) -> f32 {
        (self.sample_rate / self.fft_size() as f64) as f32
    }

    #[inline]
    pub fn bin_to_hz(&self, bin: f32) -> f32 {
        bin * self.bin_width()
    }

    #[inline]
    pub fn hz_to_bin(&self, hz: f32) -> f32 {
        hz / self.bin_width()
    }

    /// Compute the magnitude spectrum of the most recent `frame_size()` samples.
    ///
    /// Returns `false` (and clears the spectrum) if `samples` is too short.
    pub fn analyze(&mut self, samples: &[f32]) -> bool {
        let plan = &self.plans[self.active];
        let frame_size = plan.frame_size;
        if samples.len() < frame_size {
            self.num_bins = 0;
            return false;
        }

        let fft_size = frame_size * ZERO_PAD;
        let frame = &samples[samples.len() - frame_size..];
        let buffer = &mut self.buffer[..fft_size];

        for ((slot, &x), &w) in buffer.iter_mut().zip(frame).zip(&plan.window) {
            *slot = Complex::new(x * w, 0.0);
        }
        buffer[frame_size..].fill(Complex::new(0.0, 0.0));

        let scratch_len = plan.fft.get_inplace_scratch_len();
        plan.fft
            .process_with_scratch(buffer, &mut self.scratch[..scratch_len]);

        let scale = 2.0 / plan.window_sum.max(f32::EPSILON);
        let num_bins = fft_size / 2 + 1;
        for (mag, c) in self.magnitudes[..num_bins].iter_mut().zip(buffer.iter()) {
            *mag = c.norm() * scale;
        }
        self.num_bins = num_bins;
        true
    }

    /// Magnitudes of the last analyzed frame (empty before the first).
    #[inline]
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes[..self.num_bins]
    }

    #[inline]
    pub fn has_spectrum(&self) -> bool {
        self.num_bins > 0
    }

    /// Peak-pick formants from the last spectrum, replacing the previous set.
    pub fn detect_formants(&mut self) -> &FormantSet {
        self.formants.clear();
        if self.num_bins == 0 {
            return &self.formants;
        }

        let radius = FORMANT_NEIGHBOURHOOD * ZERO_PAD;
        let lo = (self.hz_to_bin(FORMANT_MIN_HZ).ceil() as usize).max(radius);
        let hi = (self.hz_to_bin(FORMANT_MAX_HZ).floor() as usize)
            .min(self.num_bins.saturating_sub(radius + 1));

        let mags = &self.magnitudes[..self.num_bins];
        for bin in lo..=hi {
            let value = mags[bin];
            if value < FORMANT_FLOOR {
                continue;
            }
            // Strict on the left so a flat top registers once
            let is_peak = mags[bin - radius..bin].iter().all(|&m| m < value)
                && mags[bin + 1..=bin + radius].iter().all(|&m| m <= value);
            if is_peak {
                let frequency = self.bin_to_hz(bin as f32);
                if frequency > FORMANT_MIN_HZ && frequency < FORMANT_MAX_HZ {
                    self.formants.insert(Formant {
                        frequency,
                        amplitude: value,
                    });
                }
            }
        }

        &self.formants
    }

    #[inline]
    pub fn formants(&self) -> &FormantSet {
        &self.formants
    }

    /// Magnitude-weighted mean frequency of the last spectrum.
    pub fn spectral_centroid(&self) -> f32 {
        let mags = self.magnitudes();
        let total: f32 = mags.iter().sum();
        if total <= f32::EPSILON {
            return 0.0;
        }
        let weighted: f32 = mags
            .iter()
            .enumerate()
            .map(|(i, &m)| self.bin_to_hz(i as f32) * m)
            .sum();
        weighted / total
    }

    pub fn reset(&mut self) {
        self.num_bins = 0;
        self.formants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn generate_sine(sample_rate: f64, freq: f32, num_samples: usize, amp: f32) -> Vec<f32> {
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                amp * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    fn peak_bin(mags: &[f32]) -> usize {
        mags.iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0
    }

    #[test]
    fn test_sine_peak_location_and_scale() {
        let sr = 44100.0;
        let mut analyzer = SpectralAnalyzer::new(sr, 2048);
        let samples = generate_sine(sr, 1000.0, 2048, 1.0);

        assert!(analyzer.analyze(&samples));
        let mags = analyzer.magnitudes();
        assert_eq!(mags.len(), 2048 * ZERO_PAD / 2 + 1);

        let bin = peak_bin(mags);
        let hz = analyzer.bin_to_hz(bin as f32);
        assert!((hz - 1000.0).abs() < analyzer.bin_width(), "peak at {hz}");
        assert_relative_eq!(mags[bin], 1.0, epsilon = 0.05);
    }

    #[test]
    fn test_too_short_frame() {
        let mut analyzer = SpectralAnalyzer::new(44100.0, 2048);
        assert!(!analyzer.analyze(&[0.0; 1024]));
        assert!(!analyzer.has_spectrum());
        assert!(analyzer.magnitudes().is_empty());
    }

    #[test]
    fn test_frame_size_selection() {
        let mut analyzer = SpectralAnalyzer::new(48000.0, 3000);
        assert_eq!(analyzer.frame_size(), 2048);
        analyzer.set_frame_size(512);
        assert_eq!(analyzer.frame_size(), 1024);
        analyzer.set_frame_size(100_000);
        assert_eq!(analyzer.frame_size(), 4096);
        assert_eq!(analyzer.fft_size(), 4096 * ZERO_PAD);
    }

    #[test]
    fn test_formants_from_resonances() {
        let sr = 44100.0;
        let mut analyzer = SpectralAnalyzer::new(sr, 4096);
        let a = generate_sine(sr, 700.0, 4096, 0.8);
        let b = generate_sine(sr, 1200.0, 4096, 0.5);
        let c = generate_sine(sr, 2600.0, 4096, 0.3);
        let low = generate_sine(sr, 120.0, 4096, 0.9);
        let mixed: Vec<f32> = (0..4096).map(|i| a[i] + b[i] + c[i] + low[i]).collect();

        analyzer.analyze(&mixed);
        let formants = *analyzer.detect_formants();

        assert!(formants.len() >= 3);
        let peaks = formants.as_slice();
        // Strongest first; the 120 Hz component lies outside the band
        assert!((peaks[0].frequency - 700.0).abs() < 15.0);
        assert!((peaks[1].frequency - 1200.0).abs() < 15.0);
        assert!((peaks[2].frequency - 2600.0).abs() < 15.0);
        assert!(peaks.iter().all(|f| f.frequency > 200.0 && f.frequency < 4000.0));
        assert!(peaks.len() <= MAX_FORMANTS);
    }

    #[test]
    fn test_formants_overwritten() {
        let sr = 44100.0;
        let mut analyzer = SpectralAnalyzer::new(sr, 2048);
        analyzer.analyze(&generate_sine(sr, 900.0, 2048, 1.0));
        assert!(!analyzer.detect_formants().is_empty());

        analyzer.analyze(&[0.0; 2048]);
        assert!(analyzer.detect_formants().is_empty());
    }

    #[test]
    fn test_formant_set_keeps_strongest() {
        let mut set = FormantSet::default();
        for (i, amp) in [0.1, 0.7, 0.3, 0.9, 0.2, 0.5, 0.05].iter().enumerate() {
            set.insert(Formant {
                frequency: 300.0 + i as f32 * 100.0,
                amplitude: *amp,
            });
        }
        let amps: Vec<f32> = set.as_slice().iter().map(|f| f.amplitude).collect();
        assert_eq!(amps, vec![0.9, 0.7, 0.5, 0.3, 0.2]);
    }

    #[test]
    fn test_spectral_centroid() {
        let sr = 44100.0;
        let mut analyzer = SpectralAnalyzer::new(sr, 2048);
        analyzer.analyze(&generate_sine(sr, 3000.0, 2048, 1.0));
        let centroid = analyzer.spectral_centroid();
        assert!((centroid - 3000.0).abs() < 150.0, "centroid {centroid}");
    }
}
