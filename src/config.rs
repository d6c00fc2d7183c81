//! Engine configuration.

use crate::mode::QualityLevel;
use voxtune_analysis::FusionWeights;
use voxtune_core::{Error, Result};
use voxtune_shift::stretcher::DEFAULT_FFT_SIZE;

/// Most channels an engine processes.
pub const MAX_CHANNELS: usize = 8;

/// Settings fixed at construction, validated by [`EngineBuilder`](crate::EngineBuilder).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct EngineConfig {
    pub channels: usize,
    pub quality: QualityLevel,
    /// Detector weights for combined fusion.
    pub fusion_weights: FusionWeights,
    /// Wet share of the granular shifter output.
    pub granular_blend: f32,
    /// Ramp time for speed and amount changes.
    pub parameter_smoothing_secs: f32,
    /// Predictions at or below this confidence are ignored.
    pub ai_confidence_threshold: f32,
    /// FFT size of the built-in formant-preserving stretcher.
    pub stretcher_fft_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            quality: QualityLevel::High,
            fusion_weights: FusionWeights::default(),
            granular_blend: voxtune_shift::granular::DEFAULT_BLEND,
            parameter_smoothing_secs: 0.05,
            ai_confidence_threshold: 0.3,
            stretcher_fft_size: DEFAULT_FFT_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::InvalidChannelCount(self.channels));
        }
        if !(0.0..=1.0).contains(&self.granular_blend) {
            return Err(Error::InvalidConfig(format!(
                "granular blend {} outside 0..=1",
                self.granular_blend
            )));
        }
        if !self.parameter_smoothing_secs.is_finite() || self.parameter_smoothing_secs < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "parameter smoothing {} s must be finite and non-negative",
                self.parameter_smoothing_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.ai_confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence threshold {} outside 0..=1",
                self.ai_confidence_threshold
            )));
        }

        let weights = self.fusion_weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidConfig(
                "fusion weights must be finite and non-negative".into(),
            ));
        }
        if weights.iter().sum::<f32>() <= 0.0 {
            return Err(Error::InvalidConfig(
                "at least one fusion weight must be positive".into(),
            ));
        }

        if !self.stretcher_fft_size.is_power_of_two() || self.stretcher_fft_size < 256 {
            return Err(Error::InvalidConfig(format!(
                "stretcher FFT size {} must be a power of two of at least 256",
                self.stretcher_fft_size
            )));
        }
        Ok(())
    }
}
