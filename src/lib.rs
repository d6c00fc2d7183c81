//! # Voxtune - Real-time Vocal Pitch Correction
//!
//! Detects the pitch of a vocal signal, snaps it to a musical key and scale,
//! and shifts the audio toward the corrected pitch block by block.
//!
//! ## Architecture
//!
//! Voxtune is an umbrella crate that coordinates:
//! - **voxtune-core** - Lock-free cells, parameter ranges and smoothing, CPU metering
//! - **voxtune-analysis** - Pitch detectors, fusion, formants, scale quantization
//! - **voxtune-shift** - Granular, hard-tune and formant-aware pitch shifting
//! - **voxtune-neural** - Pitch-model contract, inference worker, harmonic synthesis
//!
//! On top of these it provides the [`CorrectionEngine`], the three-mode
//! [`ModeSelector`] and the shared [`ControlParams`].
//!
//! ## Quick Start
//!
//! ```rust
//! use voxtune::prelude::*;
//!
//! let mut engine = CorrectionEngine::builder()
//!     .channels(1)
//!     .sample_rate(44100.0)
//!     .block_size(512)
//!     .build()?;
//!
//! let params = ParameterSet {
//!     key: Key::A,
//!     scale: Scale::Minor,
//!     ..ParameterSet::for_mode(Mode::Classic)
//! };
//!
//! let mut vocal = vec![0.0f32; 512];
//! let report = engine.process_block(&mut [&mut vocal[..]], &params);
//! assert_eq!(report.mode, Mode::Classic);
//! # Ok::<(), voxtune::Error>(())
//! ```
//!
//! ## Modes
//!
//! - **Classic** - autocorrelation detection, granular shifting
//! - **Hard** - fused detection, instant snapping with a sinc delay line
//! - **AI** - model-assisted detection, formant-preserving shift or resynthesis
//!
//! ## Feature Flags
//!
//! - `default` - Full engine
//! - `serialization` - serde support for parameters, configuration and modes

/// Re-export of voxtune-core for direct access
pub use voxtune_core as core;

/// Pitch detection and scale quantization
pub use voxtune_analysis as analysis;

/// Pitch-shifting engines
pub use voxtune_shift as shift;

/// Pitch-model contract and inference worker
pub use voxtune_neural as neural;

pub use voxtune_analysis::{Key, Scale};
pub use voxtune_core::{AtomicFloat, CpuMeter, CpuMetrics};

mod builder;
pub mod config;
mod engine;
pub mod error;
pub mod mode;
pub mod params;

pub use builder::EngineBuilder;
pub use config::{EngineConfig, MAX_CHANNELS};
pub use engine::{
    correction_target, estimator_config, BlockReport, CorrectionEngine, StretcherFactory,
    SynthesizerFactory,
};
pub use error::{Error, Result};
pub use mode::{
    pitch_algorithm, processing_params, DetectionStrategy, Mode, ModeConfig, ModeError,
    ModeEvent, ModeSelector, ModeTransition, PerformanceMetrics, ProcessingParams, QualityLevel,
};
pub use params::{ControlParams, ParamId, ParameterSet};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{BlockReport, CorrectionEngine, EngineBuilder, EngineConfig};

    // Control
    pub use crate::{ControlParams, Key, Mode, ParameterSet, QualityLevel, Scale};

    // AI path
    pub use crate::neural::{AnalysisPredictor, InferenceWorker, PitchPredictor};
}
