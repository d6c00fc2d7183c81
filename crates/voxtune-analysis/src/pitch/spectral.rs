//! Strongest-bin spectral pitch detector.

use super::{parabolic_offset, Detection, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use crate::spectrum::SpectralAnalyzer;

/// Minimum peak magnitude (full-scale sine ≈ 1.0).
const DEFAULT_MIN_MAGNITUDE: f32 = 0.01;

/// Picks the largest magnitude in the 50-800 Hz band of the analyzer's
/// current spectrum and refines it between bins.
///
/// Confidence is peak prominence: `1 - mean / peak` over the band.
#[derive(Debug, Clone)]
pub struct SpectralPeakDetector {
    min_magnitude: f32,
}

impl SpectralPeakDetector {
    pub fn new() -> Self {
        Self {
            min_magnitude: DEFAULT_MIN_MAGNITUDE,
        }
    }

    pub fn set_min_magnitude(&mut self, magnitude: f32) {
        self.min_magnitude = magnitude.max(0.0);
    }

    /// Requires a spectrum computed by [`SpectralAnalyzer::analyze`] this hop.
    pub fn detect(&self, analyzer: &SpectralAnalyzer) -> Detection {
        let mags = analyzer.magnitudes();
        let Some((lo, hi)) = band(analyzer, mags.len()) else {
            return Detection::NONE;
        };

        let (peak_bin, peak) = mags[lo..=hi]
            .iter()
            .enumerate()
            .fold((lo, f32::MIN), |best, (i, &m)| {
                if m > best.1 {
                    (lo + i, m)
                } else {
                    best
                }
            });

        if peak <= self.min_magnitude {
            return Detection::NONE;
        }

        let refined = if peak_bin > 0 && peak_bin + 1 < mags.len() {
            peak_bin as f32 + parabolic_offset(mags[peak_bin - 1], peak, mags[peak_bin + 1])
        } else {
            peak_bin as f32
        };

        let mean = mags[lo..=hi].iter().sum::<f32>() / (hi - lo + 1) as f32;

        Detection {
            frequency: analyzer.bin_to_hz(refined),
            confidence: (1.0 - mean / peak).clamp(0.0, 1.0),
        }
    }
}

impl Default for SpectralPeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Inclusive bin range for the detectable pitch band, if the spectrum covers it.
pub(crate) fn band(analyzer: &SpectralAnalyzer, num_bins: usize) -> Option<(usize, usize)> {
    if num_bins < 3 {
        return None;
    }
    let lo = (analyzer.hz_to_bin(MIN_FREQUENCY_HZ).ceil() as usize).max(1);
    let hi = (analyzer.hz_to_bin(MAX_FREQUENCY_HZ).floor() as usize).min(num_bins - 2);
    (hi > lo).then_some((lo, hi))
}
