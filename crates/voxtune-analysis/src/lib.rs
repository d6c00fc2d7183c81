//! # voxtune-analysis
//!
//! Pitch estimation and target computation for vocal pitch correction.
//!
//! - **Pitch estimation**: autocorrelation, YIN, spectral-peak and harmonic
//!   product spectrum detectors, fused and smoothed per analysis hop
//! - **Spectral analysis**: zero-padded magnitude spectra and formant peak-picking
//! - **Scale quantization**: snapping pitches to a key and scale
//!
//! All detectors work on raw `&[f32]` windows and pre-allocate their buffers.
//!
//! ## Example
//!
//! ```rust
//! use voxtune_analysis::{
//!     pitch::PitchEstimator,
//!     scale::{frequency_to_midi, midi_to_frequency, quantize, Key, Scale},
//! };
//!
//! let sample_rate = 44100.0;
//! let input: Vec<f32> = (0..8192)
//!     .map(|i| (2.0 * std::f32::consts::PI * 233.0 * i as f32 / sample_rate as f32).sin())
//!     .collect();
//!
//! let mut estimator = PitchEstimator::new(sample_rate);
//! let mut pitch = vec![0.0; input.len()];
//! estimator.process(&input, &mut pitch);
//!
//! // 233 Hz is A#3, between A and B; ties resolve to A in C major
//! let midi = frequency_to_midi(pitch[pitch.len() - 1]).unwrap();
//! let target = midi_to_frequency(quantize(midi, Key::C, Scale::Major.definition()));
//! assert!((target - 220.0).abs() < 0.1);
//! ```

pub mod pitch;
pub mod scale;
pub mod spectrum;
pub mod window;

pub use pitch::{
    fuse, Detection, EstimatorConfig, FusionPolicy, FusionWeights, PitchAlgorithm, PitchEstimate,
    PitchEstimator, PitchHistory,
};
pub use scale::{
    frequency_to_midi, midi_to_frequency, note_name, quantize, Key, Scale, ScaleDefinition,
};
pub use spectrum::{Formant, FormantSet, SpectralAnalyzer};
pub use window::AnalysisWindow;
