//! Monophonic pitch estimation.
//!
//! Four independent detectors run over the same analysis window:
//!
//! - [`AutocorrelationDetector`]: normalized autocorrelation peak
//! - [`YinDetector`]: cumulative mean normalized difference (de Cheveigné & Kawahara)
//! - [`SpectralPeakDetector`]: strongest bin of the magnitude spectrum
//! - [`HarmonicProductDetector`]: harmonic product spectrum
//!
//! [`PitchEstimator`] fuses them with a fixed weighted average over the
//! detectors that found a pitch, then smooths the result with a short
//! recency-weighted history.

mod autocorrelation;
mod estimator;
mod harmonic;
mod history;
mod spectral;
mod yin;

pub use autocorrelation::AutocorrelationDetector;
pub use estimator::{fuse, EstimatorConfig, FusionWeights, PitchEstimator};
pub use harmonic::HarmonicProductDetector;
pub use history::{PitchHistory, HISTORY_LEN};
pub use spectral::SpectralPeakDetector;
pub use yin::YinDetector;

use crate::scale::frequency_to_midi;

/// Lowest frequency any detector reports.
pub const MIN_FREQUENCY_HZ: f32 = 50.0;

/// Highest frequency any detector reports.
pub const MAX_FREQUENCY_HZ: f32 = 800.0;

/// Output of the estimator for one hop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PitchEstimate {
    /// Fundamental in Hz; 0.0 when unvoiced
    pub frequency_hz: f32,
    /// 0.0 - 1.0
    pub confidence: f32,
    /// RMS level of the analysis window
    pub rms: f32,
}

impl PitchEstimate {
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        frequency_hz: 0.0,
        confidence: 0.0,
        rms: 0.0,
    };

    #[inline]
    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }

    /// Continuous MIDI note, if voiced.
    pub fn midi_note(&self) -> Option<f32> {
        frequency_to_midi(self.frequency_hz)
    }
}

/// Raw result of a single detector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Detection {
    pub frequency: f32,
    pub confidence: f32,
}

impl Detection {
    pub const NONE: Detection = Detection {
        frequency: 0.0,
        confidence: 0.0,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.frequency > 0.0
    }
}

/// Individual detection algorithms, in fusion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PitchAlgorithm {
    Autocorrelation,
    Yin,
    SpectralPeak,
    HarmonicProduct,
}

impl PitchAlgorithm {
    pub const ALL: [PitchAlgorithm; 4] = [
        PitchAlgorithm::Autocorrelation,
        PitchAlgorithm::Yin,
        PitchAlgorithm::SpectralPeak,
        PitchAlgorithm::HarmonicProduct,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which detectors run and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum FusionPolicy {
    /// Autocorrelation only, every 256 samples.
    #[default]
    Basic,
    /// Every enabled detector, every 128 samples.
    Combined,
}

impl FusionPolicy {
    #[inline]
    pub fn hop_size(self) -> usize {
        match self {
            FusionPolicy::Basic => 256,
            FusionPolicy::Combined => 128,
        }
    }
}

/// Vertex offset of the parabola through three equally spaced points.
///
/// Returns a value in `[-0.5, 0.5]` relative to the centre point, or 0 when
/// the points are collinear.
#[inline]
pub(crate) fn parabolic_offset(left: f32, centre: f32, right: f32) -> f32 {
    let denominator = left - 2.0 * centre + right;
    if denominator.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}
