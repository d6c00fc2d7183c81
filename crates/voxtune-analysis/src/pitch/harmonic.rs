//! Harmonic product spectrum pitch detector.
//!
//! `P(k) = Π_{h=1..=5} |X(h·k)|`, maximized over the pitch band. Multiplying
//! decimated copies of the spectrum reinforces a fundamental whose overtones
//! line up, even when the fundamental itself is weak.
//!
//! Two guards keep pure tones from collapsing onto a subharmonic: each
//! factor is floored at 1% of the spectral maximum, and only bins holding at
//! least 10% of that maximum are candidates.

use super::spectral::band;
use super::Detection;
use crate::spectrum::SpectralAnalyzer;

/// Highest harmonic multiplied in.
pub const HARMONICS: usize = 5;

const MIN_MAGNITUDE: f32 = 0.01;
const FACTOR_FLOOR: f32 = 0.01;
const CANDIDATE_RATIO: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct HarmonicProductDetector {
    product: Vec<f32>,
}

impl HarmonicProductDetector {
    /// Pre-allocate for spectra of up to `max_bins` bins.
    pub fn new(max_bins: usize) -> Self {
        Self {
            product: vec![0.0; max_bins],
        }
    }

    /// Requires a spectrum computed by [`SpectralAnalyzer::analyze`] this hop.
    ///
    /// No sub-bin refinement; resolution is one (zero-padded) bin.
    pub fn detect(&mut self, analyzer: &SpectralAnalyzer) -> Detection {
        let mags = analyzer.magnitudes();
        let Some((lo, hi)) = band(analyzer, mags.len()) else {
            return Detection::NONE;
        };
        if hi >= self.product.len() {
            return Detection::NONE;
        }

        let max_mag = mags.iter().copied().fold(0.0f32, f32::max);
        if max_mag <= MIN_MAGNITUDE {
            return Detection::NONE;
        }
        let floor = max_mag * FACTOR_FLOOR;
        let gate = max_mag * CANDIDATE_RATIO;

        let mut best_bin = 0;
        let mut best = 0.0f32;
        let mut total = 0.0f32;
        for bin in lo..=hi {
            let value = if mags[bin] < gate {
                0.0
            } else {
                (1..=HARMONICS)
                    .map(|h| mags.get(bin * h).copied().unwrap_or(0.0).max(floor))
                    .product()
            };
            self.product[bin] = value;
            total += value;
            if value > best {
                best = value;
                best_bin = bin;
            }
        }

        if best_bin == 0 || best <= 0.0 {
            return Detection::NONE;
        }

        let mean = total / (hi - lo + 1) as f32;
        Detection {
            frequency: analyzer.bin_to_hz(best_bin as f32),
            confidence: (1.0 - mean / best).clamp(0.0, 1.0),
        }
    }
}
