//! Model-assisted pitch analysis and resynthesis for voxtune.
//!
//! Pitch models run on a background thread ([`InferenceWorker`]) fed through
//! a lock-free ring buffer. The audio thread reads the most recent
//! [`PitchPrediction`] from a [`PredictionSlot`] and never waits for
//! inference. A [`HarmonicSynthesizer`] can render a corrected voice from the
//! predicted harmonic profile.
//!
//! No model format is built in. [`AnalysisPredictor`] wraps the signal
//! processing estimator so the whole path works without a model file, and
//! [`AdditiveSynthesizer`] is a small harmonic-plus-noise renderer.
//!
//! ```no_run
//! use voxtune_neural::{AnalysisPredictor, InferenceWorker, WorkerConfig};
//!
//! let (worker, mut link) = InferenceWorker::spawn(
//!     Box::new(AnalysisPredictor::new(48000.0)),
//!     48000.0,
//!     WorkerConfig::default(),
//! )?;
//!
//! // Audio thread
//! link.push(&[0.0; 256]);
//! let prediction = link.latest();
//! if prediction.is_usable(0.3) {
//!     println!("{} Hz", prediction.frequency);
//! }
//! drop(worker);
//! # Ok::<(), voxtune_neural::AiError>(())
//! ```

pub mod error;
pub mod model;
pub mod predictor;
pub mod slot;
pub mod synth;
pub mod worker;

pub use error::{AiError, AiErrorCode, Result};
pub use model::{
    Harmonics, HarmonicSynthesizer, ModelInfo, PitchPrediction, PitchPredictor, SynthesisParams,
};
pub use predictor::AnalysisPredictor;
pub use slot::PredictionSlot;
pub use synth::AdditiveSynthesizer;
pub use worker::{AiLink, InferenceWorker, WorkerConfig};
