//! Signal-processing stand-in for a neural pitch model.

use crate::error::{AiError, Result};
use crate::model::{Harmonics, ModelInfo, PitchPredictor, PitchPrediction};
use voxtune_analysis::{AnalysisWindow, EstimatorConfig, FusionPolicy, PitchEstimator};

/// Harmonic profile length reported per prediction.
const PROFILE_HARMONICS: usize = 8;

/// Per-harmonic decay of the reported profile.
const PROFILE_DECAY: f32 = 0.8;

/// [`PitchPredictor`] backed by the combined-fusion [`PitchEstimator`].
///
/// Useful where no model file is available: the engine's AI path runs end to
/// end with the same hand-off and threading as a real model.
pub struct AnalysisPredictor {
    estimator: PitchEstimator,
}

impl AnalysisPredictor {
    pub fn new(sample_rate: f64) -> Self {
        let config = EstimatorConfig {
            window_size: 2048,
            policy: FusionPolicy::Combined,
            harmonic_analysis: true,
            ..EstimatorConfig::default()
        };
        Self {
            estimator: PitchEstimator::with_config(sample_rate, config),
        }
    }
}

impl PitchPredictor for AnalysisPredictor {
    fn predict(&mut self, audio: &[f32], sample_rate: f32) -> Result<PitchPrediction> {
        if audio.is_empty() {
            return Err(AiError::processing("empty audio window"));
        }
        let sample_rate = sample_rate as f64;
        if (self.estimator.sample_rate() - sample_rate).abs() > 0.1 {
            self.estimator.set_sample_rate(sample_rate);
        }

        let estimate = self
            .estimator
            .estimate(&AnalysisWindow::new(audio, sample_rate));
        if !estimate.is_voiced() {
            return Ok(PitchPrediction::unvoiced());
        }

        let confidence = estimate.confidence;
        let harmonics: Harmonics = (0..PROFILE_HARMONICS)
            .map(|h| confidence * PROFILE_DECAY.powi(h as i32))
            .collect();

        Ok(PitchPrediction {
            frequency: estimate.frequency_hz,
            confidence,
            voicing: confidence,
            harmonics,
        })
    }

    fn is_loaded(&self) -> bool {
        true
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "analysis".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Fused autocorrelation/YIN/spectral estimator".to_string(),
            sample_rate: self.estimator.sample_rate() as f32,
            input_size: self.estimator.window_size(),
            output_size: PROFILE_HARMONICS,
            is_loaded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(sr: f32, freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_predicts_sine_pitch() {
        let mut predictor = AnalysisPredictor::new(44100.0);
        let prediction = predictor
            .predict(&sine(44100.0, 220.0, 2048), 44100.0)
            .unwrap();

        assert!(prediction.is_voiced());
        assert!((prediction.frequency - 220.0).abs() < 2.2);
        assert_eq!(prediction.harmonics.len(), PROFILE_HARMONICS);
        assert_relative_eq!(
            prediction.harmonics[1],
            prediction.confidence * PROFILE_DECAY
        );
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let mut predictor = AnalysisPredictor::new(44100.0);
        let prediction = predictor.predict(&[0.0; 2048], 44100.0).unwrap();
        assert_eq!(prediction, PitchPrediction::unvoiced());
    }

    #[test]
    fn test_empty_window_is_error() {
        let mut predictor = AnalysisPredictor::new(44100.0);
        assert!(predictor.predict(&[], 44100.0).is_err());
    }

    #[test]
    fn test_follows_sample_rate() {
        let mut predictor = AnalysisPredictor::new(44100.0);
        predictor
            .predict(&sine(48000.0, 300.0, 2048), 48000.0)
            .unwrap();
        assert_eq!(predictor.info().sample_rate, 48000.0);
        assert!(predictor.info().is_loaded);
    }
}
