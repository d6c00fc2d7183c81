//! Model-facing data types and traits.
//!
//! A pitch model (CREPE-style) turns audio into a [`PitchPrediction`]; a
//! harmonic synthesizer (DDSP-style) renders [`SynthesisParams`] back into
//! audio. Both are external capabilities: the engine only depends on these
//! traits and treats a model that is not loaded as absent.

use crate::error::Result;
use smallvec::SmallVec;

/// Inline storage for per-harmonic values.
pub type Harmonics = SmallVec<[f32; 16]>;

/// One pitch model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchPrediction {
    /// Fundamental in Hz, 0.0 when unvoiced.
    pub frequency: f32,
    pub confidence: f32,
    /// Probability the frame is voiced.
    pub voicing: f32,
    /// Relative harmonic amplitudes, fundamental first.
    pub harmonics: Harmonics,
}

impl PitchPrediction {
    pub fn unvoiced() -> Self {
        Self::default()
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0
    }

    /// Voiced and at least `threshold` confident.
    pub fn is_usable(&self, threshold: f32) -> bool {
        self.is_voiced() && self.confidence > threshold
    }
}

/// Control input for harmonic-plus-noise synthesis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisParams {
    pub fundamental_freq: f32,
    pub harmonic_amplitudes: Harmonics,
    /// Noise envelope, cycled over the output.
    pub noise_level: Harmonics,
    /// Output peak amplitude.
    pub loudness: f32,
}

impl SynthesisParams {
    /// Resynthesize `prediction`'s harmonic profile at `fundamental_freq`.
    pub fn from_prediction(
        prediction: &PitchPrediction,
        fundamental_freq: f32,
        loudness: f32,
    ) -> Self {
        Self {
            fundamental_freq,
            harmonic_amplitudes: prediction.harmonics.clone(),
            noise_level: Harmonics::new(),
            loudness,
        }
    }
}

/// Static description of a loaded model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub sample_rate: f32,
    pub input_size: usize,
    pub output_size: usize,
    pub is_loaded: bool,
}

impl Default for ModelInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            description: String::new(),
            sample_rate: 44100.0,
            input_size: 0,
            output_size: 0,
            is_loaded: false,
        }
    }
}

/// Pitch model. Runs off the audio thread.
pub trait PitchPredictor: Send {
    fn predict(&mut self, audio: &[f32], sample_rate: f32) -> Result<PitchPrediction>;

    fn is_loaded(&self) -> bool;

    fn info(&self) -> ModelInfo;
}

/// Harmonic synthesizer. Called on the audio thread, so implementations
/// must not block or allocate.
pub trait HarmonicSynthesizer: Send {
    /// Render `params` into `out`, overwriting it.
    fn synthesize(
        &mut self,
        params: &SynthesisParams,
        out: &mut [f32],
        sample_rate: f32,
    ) -> Result<()>;

    fn is_loaded(&self) -> bool;

    /// Clear oscillator state.
    fn reset(&mut self) {}
}
