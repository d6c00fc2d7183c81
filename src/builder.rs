//! Builder for configuring and constructing a `CorrectionEngine`.

use crate::config::EngineConfig;
use crate::engine::{CorrectionEngine, StretcherFactory, SynthesizerFactory};
use crate::mode::{Mode, QualityLevel};
use crate::Result;
use voxtune_analysis::FusionWeights;
use voxtune_neural::{
    AdditiveSynthesizer, HarmonicSynthesizer, InferenceWorker, PitchPredictor, WorkerConfig,
};
use voxtune_shift::{PitchStretcher, SpectralStretcher};

/// The engine is prepared during `build()` when both a sample rate and a
/// block size are given; otherwise call `prepare()` yourself. A pitch model
/// needs the sample rate to start its worker.
///
/// # Example
///
/// ```rust
/// use voxtune::{CorrectionEngine, Mode, QualityLevel};
///
/// let engine = CorrectionEngine::builder()
///     .channels(1)
///     .quality(QualityLevel::Good)
///     .mode(Mode::Hard)
///     .sample_rate(48000.0)
///     .block_size(256)
///     .spectral_stretcher()
///     .build()?;
///
/// assert!(engine.is_prepared());
/// assert_eq!(engine.mode(), Mode::Hard);
/// # Ok::<(), voxtune::Error>(())
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    sample_rate: Option<f64>,
    block_size: Option<usize>,
    mode: Option<Mode>,
    stretcher: Option<StretcherFactory>,
    spectral_stretcher: bool,
    synthesizer: Option<SynthesizerFactory>,
    predictor: Option<Box<dyn PitchPredictor>>,
    worker_config: WorkerConfig,
}

impl EngineBuilder {
    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 2
    pub fn channels(mut self, count: usize) -> Self {
        self.config.channels = count;
        self
    }

    /// Default: High
    pub fn quality(mut self, quality: QualityLevel) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn fusion_weights(mut self, weights: FusionWeights) -> Self {
        self.config.fusion_weights = weights;
        self
    }

    /// Default: 0.7
    pub fn granular_blend(mut self, blend: f32) -> Self {
        self.config.granular_blend = blend;
        self
    }

    /// Default: 0.05 s
    pub fn parameter_smoothing(mut self, seconds: f32) -> Self {
        self.config.parameter_smoothing_secs = seconds;
        self
    }

    /// Default: 0.3
    pub fn ai_confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.ai_confidence_threshold = threshold;
        self
    }

    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Initial mode, entered without cooldown. Default: Classic
    ///
    /// It counts as the last mode the parameters asked for, so blocks whose
    /// `ParameterSet::mode` matches leave it alone. A block asking for a
    /// different mode still requests a switch.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Formant-preserving stretcher for AI mode, one per channel.
    pub fn stretcher<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn PitchStretcher> + Send + 'static,
    {
        self.stretcher = Some(Box::new(factory));
        self.spectral_stretcher = false;
        self
    }

    /// Use the built-in [`SpectralStretcher`] at the configured FFT size.
    pub fn spectral_stretcher(mut self) -> Self {
        self.stretcher = None;
        self.spectral_stretcher = true;
        self
    }

    /// Harmonic synthesizer for AI mode, one per channel.
    pub fn synthesizer<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn HarmonicSynthesizer> + Send + 'static,
    {
        self.synthesizer = Some(Box::new(factory));
        self
    }

    /// Use the built-in [`AdditiveSynthesizer`].
    pub fn additive_synthesizer(self) -> Self {
        self.synthesizer(|| Box::new(AdditiveSynthesizer::new()) as Box<dyn HarmonicSynthesizer>)
    }

    /// Pitch model run on a background thread in AI mode.
    pub fn predictor(mut self, predictor: Box<dyn PitchPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    pub fn build(self) -> Result<CorrectionEngine> {
        let mut engine = CorrectionEngine::new(self.config)?;

        if let Some(mode) = self.mode {
            engine.start_in_mode(mode);
        }

        let stretcher = match self.stretcher {
            Some(factory) => Some(factory),
            None if self.spectral_stretcher => {
                let fft_size = engine.config().stretcher_fft_size;
                Some(Box::new(move || {
                    Box::new(SpectralStretcher::new(fft_size)) as Box<dyn PitchStretcher>
                }) as StretcherFactory)
            }
            None => None,
        };
        engine.set_stretcher_factory(stretcher);
        engine.set_synthesizer_factory(self.synthesizer);

        if let (Some(sample_rate), Some(block_size)) = (self.sample_rate, self.block_size) {
            engine.prepare(sample_rate, block_size)?;
        }

        if let Some(predictor) = self.predictor {
            let sample_rate = self
                .sample_rate
                .ok_or(voxtune_core::Error::InvalidConfig(
                    "a pitch model needs a sample rate".into(),
                ))?;
            let (worker, link) =
                InferenceWorker::spawn(predictor, sample_rate as f32, self.worker_config)?;
            engine.attach_ai(link, Some(worker));
        }

        Ok(engine)
    }
}
