//! Block-level pitch correction.
//!
//! ## Algorithm Overview
//!
//! Per channel and per block:
//!
//! 1. [`PitchEstimator::process`] writes a held pitch for every sample
//! 2. The block is split into runs of constant held pitch
//! 3. Each run's pitch is quantized to the key and scale, and the target is
//!    pulled toward it by the correction amount
//! 4. The mode's shift strategy moves the run from its pitch to the target,
//!    with speed and amount ramped per run
//!
//! In AI mode a model prediction, when one is available and confident,
//! replaces or sharpens the estimator track. With a harmonic synthesizer
//! installed the block is resynthesized at the target instead of shifted.
//!
//! ## RT-Safety
//!
//! `process_block` never allocates, locks or waits. Buffers are sized in
//! [`CorrectionEngine::prepare`]; model results are read from a lock-free
//! slot and inference is never awaited.

use crate::config::EngineConfig;
use crate::mode::{
    processing_params, Mode, ModeError, ModeEvent, ModeSelector, ModeTransition,
    ProcessingParams, QualityLevel,
};
use crate::params::ParameterSet;
use crossbeam_channel::Receiver;
use std::time::Instant;
use voxtune_analysis::{
    frequency_to_midi, midi_to_frequency, quantize, EstimatorConfig, FormantSet, FusionPolicy,
    FusionWeights, Key, PitchEstimator, Scale,
};
use voxtune_core::{validate_stream, CpuMeter, Result, SmoothedValue};
use voxtune_neural::{
    AiLink, Harmonics, HarmonicSynthesizer, InferenceWorker, SynthesisParams,
};
use voxtune_shift::{PitchShifter, PitchStretcher, ShiftStrategy};

/// Creates one stretcher per channel.
pub type StretcherFactory = Box<dyn Fn() -> Box<dyn PitchStretcher> + Send>;

/// Creates one synthesizer per channel.
pub type SynthesizerFactory = Box<dyn Fn() -> Box<dyn HarmonicSynthesizer> + Send>;

/// Hard mode reaches full snap at 5% speed.
const HARD_SPEED_SCALE: f32 = 20.0;

/// Estimator settings for a mode.
///
/// Classic runs autocorrelation alone unless the quality level turns on
/// harmonic analysis; every other case uses combined fusion.
pub fn estimator_config(
    mode: Mode,
    params: &ProcessingParams,
    weights: FusionWeights,
) -> EstimatorConfig {
    let policy = if mode == Mode::Classic && !params.enable_harmonic_analysis {
        FusionPolicy::Basic
    } else {
        FusionPolicy::Combined
    };
    EstimatorConfig {
        window_size: params.window_size,
        policy,
        harmonic_analysis: params.enable_harmonic_analysis,
        formant_tracking: params.enable_formant_correction && policy == FusionPolicy::Combined,
        weights,
    }
}

/// Target pitch for `current`: its nearest scale note, approached by `amount` (0-1).
///
/// `None` when `current` is unvoiced.
pub fn correction_target(current: f32, key: Key, scale: Scale, amount: f32) -> Option<f32> {
    let midi = frequency_to_midi(current)?;
    let snapped = midi_to_frequency(quantize(midi, key, scale.definition()));
    let ratio = snapped / current;
    Some(current * (1.0 + (ratio - 1.0) * amount.clamp(0.0, 1.0)))
}

/// Summary of one `process_block` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockReport {
    /// Mode the block was processed in.
    pub mode: Mode,
    pub frames: usize,
    /// Last pitch on the first channel, 0 when unvoiced.
    pub pitch_hz: f32,
    /// Last correction target on the first channel, 0 when none.
    pub target_hz: f32,
    /// Any sample was shifted or resynthesized.
    pub corrected: bool,
    /// A model prediction was used on this block.
    pub ai_used: bool,
    pub transition: Option<ModeTransition>,
    pub mode_error: Option<ModeError>,
    /// Averaged processing load.
    pub cpu_percent: f32,
}

/// Confident model output for the current chunk.
struct AiFrame {
    pitch: f32,
    confidence: f32,
    harmonics: Harmonics,
}

struct ChunkContext<'a> {
    mode: Mode,
    params: &'a ProcessingParams,
    key: Key,
    scale: Scale,
    speed: &'a SmoothedValue,
    amount: &'a SmoothedValue,
    ai: Option<&'a AiFrame>,
    sample_rate: f32,
}

#[derive(Default)]
struct ChannelOutcome {
    pitch: f32,
    target: f32,
    corrected: bool,
    ai_used: bool,
}

struct Channel {
    estimator: PitchEstimator,
    shifter: PitchShifter,
    synthesizer: Option<Box<dyn HarmonicSynthesizer>>,
    pitch: Vec<f32>,
    synth: Vec<f32>,
}

impl Channel {
    fn new(
        sample_rate: f64,
        block_size: usize,
        estimator: EstimatorConfig,
        config: &EngineConfig,
        params: &ProcessingParams,
        stretcher: Option<&StretcherFactory>,
        synthesizer: Option<&SynthesizerFactory>,
    ) -> Result<Self> {
        let mut shifter = PitchShifter::new(sample_rate, block_size)?;
        shifter.set_granular_blend(config.granular_blend);
        shifter.set_formant_correction(params.enable_formant_correction);
        if let Some(factory) = stretcher {
            shifter.set_stretcher(Some(factory()));
        }

        Ok(Self {
            estimator: PitchEstimator::with_config(sample_rate, estimator),
            shifter,
            synthesizer: synthesizer.map(|factory| factory()),
            pitch: vec![0.0; block_size],
            synth: vec![0.0; block_size],
        })
    }

    fn reset(&mut self) {
        self.estimator.reset();
        self.shifter.reset();
        if let Some(synth) = self.synthesizer.as_mut() {
            synth.reset();
        }
        self.pitch.fill(0.0);
        self.synth.fill(0.0);
    }

    fn process(&mut self, block: &mut [f32], ctx: &ChunkContext<'_>) -> ChannelOutcome {
        let n = block.len();
        let pitch = &mut self.pitch[..n];
        self.estimator.process(block, pitch);

        if let Some(ai) = ctx.ai {
            for p in pitch.iter_mut() {
                *p = if *p > 0.0 {
                    ai.confidence * ai.pitch + (1.0 - ai.confidence) * *p
                } else {
                    ai.pitch
                };
            }

            if let Some(outcome) = self.resynthesize(block, ai, ctx) {
                return outcome;
            }
        }

        let strategy = match ctx.mode {
            Mode::Classic => ShiftStrategy::Granular,
            Mode::Hard => ShiftStrategy::Hard,
            Mode::Ai => ShiftStrategy::FormantAware,
        };
        let mut speed = ctx.speed.clone();
        let mut amount = ctx.amount.clone();
        let mut outcome = ChannelOutcome {
            ai_used: ctx.ai.is_some(),
            ..ChannelOutcome::default()
        };

        let pitch = &self.pitch[..n];
        let mut start = 0;
        while start < n {
            let current = pitch[start];
            let mut end = start + 1;
            while end < n && pitch[end] == current {
                end += 1;
            }
            let run = end - start;

            let speed01 = speed.advance(run) / 100.0;
            let amount01 =
                (amount.advance(run) / 100.0 * ctx.params.amount_multiplier).min(1.0);
            let shift_speed = match ctx.mode {
                Mode::Hard => (speed01 * HARD_SPEED_SCALE).min(1.0),
                _ => (speed01 * ctx.params.speed_multiplier).min(1.0),
            };

            let target =
                correction_target(current, ctx.key, ctx.scale, amount01).unwrap_or(0.0);
            if self.shifter.shift(
                strategy,
                &mut block[start..end],
                current,
                target,
                shift_speed,
            ) {
                outcome.corrected = true;
            }
            outcome.pitch = current;
            outcome.target = target;
            start = end;
        }

        outcome
    }

    /// Blend a resynthesized voice into `block`. `None` leaves the block untouched.
    fn resynthesize(
        &mut self,
        block: &mut [f32],
        ai: &AiFrame,
        ctx: &ChunkContext<'_>,
    ) -> Option<ChannelOutcome> {
        let synth = self.synthesizer.as_mut().filter(|s| s.is_loaded())?;
        let n = block.len();

        let blend = (ctx.speed.clone().advance(n) / 100.0).clamp(0.0, 1.0);
        let amount01 =
            (ctx.amount.clone().advance(n) / 100.0 * ctx.params.amount_multiplier).min(1.0);
        let target = correction_target(ai.pitch, ctx.key, ctx.scale, amount01)?;

        let loudness = block.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        let params = SynthesisParams {
            fundamental_freq: target,
            harmonic_amplitudes: ai.harmonics.clone(),
            noise_level: Harmonics::new(),
            loudness,
        };

        let wet = &mut self.synth[..n];
        synth.synthesize(&params, wet, ctx.sample_rate).ok()?;

        self.shifter.observe(block);
        for (dry, &wet) in block.iter_mut().zip(wet.iter()) {
            *dry = *dry * (1.0 - blend) + wet * blend;
        }

        Some(ChannelOutcome {
            pitch: ai.pitch,
            target,
            corrected: blend > 0.0,
            ai_used: true,
        })
    }
}

struct AiAttachment {
    link: AiLink,
    worker: Option<InferenceWorker>,
}

/// Multi-channel real-time pitch corrector.
///
/// Call [`prepare`](Self::prepare) before processing and whenever the sample
/// rate or maximum block size changes. Until then
/// [`process_block`](Self::process_block) leaves audio untouched.
///
/// # Example
///
/// ```rust
/// use voxtune::{CorrectionEngine, EngineConfig, Mode, ParameterSet};
///
/// let mut engine = CorrectionEngine::new(EngineConfig {
///     channels: 1,
///     ..EngineConfig::default()
/// })?;
/// engine.prepare(44100.0, 512)?;
///
/// let mut left = vec![0.0f32; 512];
/// let params = ParameterSet::for_mode(Mode::Hard);
/// let report = engine.process_block(&mut [&mut left[..]], &params);
/// assert_eq!(report.frames, 512);
/// assert!(!report.corrected);
/// # Ok::<(), voxtune::Error>(())
/// ```
pub struct CorrectionEngine {
    config: EngineConfig,
    sample_rate: f64,
    block_size: usize,
    channels: Vec<Channel>,

    selector: ModeSelector,
    applied: Option<(Mode, QualityLevel)>,
    params: ProcessingParams,
    last_param_mode: Option<Mode>,

    speed: SmoothedValue,
    amount: SmoothedValue,
    cpu: CpuMeter,

    stretcher_factory: Option<StretcherFactory>,
    synthesizer_factory: Option<SynthesizerFactory>,
    ai: Option<AiAttachment>,
    ai_pitch: f32,
}

impl CorrectionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let defaults = ParameterSet::default();
        let mut selector = ModeSelector::new();
        selector.set_quality(config.quality);

        Ok(Self {
            params: processing_params(selector.current_mode(), config.quality),
            config,
            sample_rate: 0.0,
            block_size: 0,
            channels: Vec::new(),
            selector,
            applied: None,
            last_param_mode: None,
            speed: SmoothedValue::immediate(defaults.speed),
            amount: SmoothedValue::immediate(defaults.amount),
            cpu: CpuMeter::new(44100.0),
            stretcher_factory: None,
            synthesizer_factory: None,
            ai: None,
            ai_pitch: 0.0,
        })
    }

    pub fn builder() -> crate::EngineBuilder {
        crate::EngineBuilder::default()
    }

    /// Size every buffer for `sample_rate` and blocks of up to `block_size`.
    ///
    /// Clears all history. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, block_size: usize) -> Result<()> {
        validate_stream(sample_rate, block_size)?;

        let mode = self.selector.current_mode();
        let quality = self.selector.quality();
        self.params = processing_params(mode, quality);
        let estimator = estimator_config(mode, &self.params, self.config.fusion_weights);

        self.channels = (0..self.config.channels)
            .map(|_| {
                Channel::new(
                    sample_rate,
                    block_size,
                    estimator,
                    &self.config,
                    &self.params,
                    self.stretcher_factory.as_ref(),
                    self.synthesizer_factory.as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let smoothing = self.config.parameter_smoothing_secs;
        self.speed = SmoothedValue::new(self.speed.target(), smoothing, sample_rate as f32);
        self.amount = SmoothedValue::new(self.amount.target(), smoothing, sample_rate as f32);
        self.cpu.set_sample_rate(sample_rate);

        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.applied = Some((mode, quality));
        self.ai_pitch = 0.0;

        tracing::info!(
            "Correction engine prepared: {} Hz, {} samples, {} channels, {} mode",
            sample_rate,
            block_size,
            self.config.channels,
            mode
        );
        Ok(())
    }

    /// Clear pitch history, shifter state and parameter ramps without resizing.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.speed.skip_to_target();
        self.amount.skip_to_target();
        self.cpu.reset();
        self.ai_pitch = 0.0;
        tracing::debug!("Correction engine reset");
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn channel_count(&self) -> usize {
        self.config.channels
    }

    pub fn mode(&self) -> Mode {
        self.selector.current_mode()
    }

    pub fn mode_selector(&self) -> &ModeSelector {
        &self.selector
    }

    pub fn mode_selector_mut(&mut self) -> &mut ModeSelector {
        &mut self.selector
    }

    /// Enter `mode` without cooldown and treat it as the last requested mode.
    pub(crate) fn start_in_mode(&mut self, mode: Mode) {
        let quality = self.config.quality;
        self.selector = ModeSelector::with_mode(mode);
        self.selector.set_quality(quality);
        self.last_param_mode = Some(mode);
    }

    /// Request a mode switch outside the parameter set.
    pub fn request_mode(&mut self, mode: Mode) -> std::result::Result<Option<ModeTransition>, ModeError> {
        self.selector.switch_to_mode(mode)
    }

    pub fn subscribe(&mut self, capacity: usize) -> Receiver<ModeEvent> {
        self.selector.subscribe(capacity)
    }

    /// Takes effect on the next block.
    pub fn set_quality(&mut self, quality: QualityLevel) {
        self.config.quality = quality;
        self.selector.set_quality(quality);
    }

    pub fn cpu_meter(&self) -> &CpuMeter {
        &self.cpu
    }

    /// Samples of delay added by the active mode.
    pub fn latency_samples(&self) -> usize {
        match (self.selector.current_mode(), self.channels.first()) {
            (Mode::Ai, Some(channel)) => channel.shifter.formant().stretcher_latency(),
            _ => 0,
        }
    }

    /// Held pitch estimate of `channel`, 0 when unvoiced or out of range.
    pub fn current_pitch(&self, channel: usize) -> f32 {
        self.channels
            .get(channel)
            .map_or(0.0, |c| c.estimator.quick_estimate().frequency_hz)
    }

    pub fn formants(&self, channel: usize) -> Option<&FormantSet> {
        self.channels.get(channel).map(|c| c.estimator.formants())
    }

    /// Install a formant-preserving stretcher on every channel. Not real-time safe.
    pub fn set_stretcher_factory(&mut self, factory: Option<StretcherFactory>) {
        for channel in &mut self.channels {
            channel
                .shifter
                .set_stretcher(factory.as_ref().map(|make| make()));
        }
        self.stretcher_factory = factory;
    }

    /// Install a harmonic synthesizer on every channel. Not real-time safe.
    pub fn set_synthesizer_factory(&mut self, factory: Option<SynthesizerFactory>) {
        for channel in &mut self.channels {
            channel.synthesizer = factory.as_ref().map(|make| make());
        }
        self.synthesizer_factory = factory;
    }

    /// Feed AI-mode input to `link` and read its predictions.
    ///
    /// `worker`, if given, is kept alive as long as the link is attached.
    pub fn attach_ai(&mut self, link: AiLink, worker: Option<InferenceWorker>) {
        tracing::info!("Pitch model attached");
        self.ai = Some(AiAttachment { link, worker });
        self.ai_pitch = 0.0;
    }

    /// Detach the model, stopping its worker if the engine owns one.
    pub fn detach_ai(&mut self) {
        if let Some(mut ai) = self.ai.take() {
            if let Some(worker) = ai.worker.as_mut() {
                worker.stop();
            }
            tracing::info!("Pitch model detached");
        }
    }

    pub fn ai_link(&self) -> Option<&AiLink> {
        self.ai.as_ref().map(|ai| &ai.link)
    }

    /// Correct `channels` in place.
    ///
    /// Processes `min(channels.len(), channel_count())` channels over the
    /// shortest channel's length; blocks longer than the prepared size are
    /// processed in chunks. A change of `params.mode` since the previous
    /// block is forwarded to the [`ModeSelector`]; a rejected request is
    /// reported once and not retried.
    pub fn process_block(
        &mut self,
        channels: &mut [&mut [f32]],
        params: &ParameterSet,
    ) -> BlockReport {
        self.process_block_at(channels, params, Instant::now())
    }

    /// [`process_block`](Self::process_block) with an explicit clock for
    /// mode-switch cooldowns.
    pub fn process_block_at(
        &mut self,
        channels: &mut [&mut [f32]],
        params: &ParameterSet,
        now: Instant,
    ) -> BlockReport {
        let mut report = BlockReport {
            mode: self.selector.current_mode(),
            ..BlockReport::default()
        };
        if !self.is_prepared() {
            return report;
        }

        let start = Instant::now();
        let params = params.sanitized();

        if self.last_param_mode != Some(params.mode) {
            self.last_param_mode = Some(params.mode);
            match self.selector.switch_to_mode_at(params.mode, now) {
                Ok(transition) => report.transition = transition,
                Err(error) => report.mode_error = Some(error),
            }
        }
        self.apply_mode();

        let mode = self.selector.current_mode();
        report.mode = mode;
        self.speed.set_target(params.speed);
        self.amount.set_target(params.amount);

        let active = channels.len().min(self.channels.len());
        let frames = channels[..active]
            .iter()
            .map(|c| c.len())
            .min()
            .unwrap_or(0);
        report.frames = frames;

        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(self.block_size);

            let ai = if mode == Mode::Ai {
                self.poll_ai(&channels[0][offset..offset + n])
            } else {
                None
            };

            let ctx = ChunkContext {
                mode,
                params: &self.params,
                key: params.key,
                scale: params.scale,
                speed: &self.speed,
                amount: &self.amount,
                ai: ai.as_ref(),
                sample_rate: self.sample_rate as f32,
            };

            for (index, (data, channel)) in channels[..active]
                .iter_mut()
                .zip(self.channels.iter_mut())
                .enumerate()
            {
                let outcome = channel.process(&mut data[offset..offset + n], &ctx);
                report.corrected |= outcome.corrected;
                if index == 0 {
                    report.pitch_hz = outcome.pitch;
                    report.target_hz = outcome.target;
                    report.ai_used = outcome.ai_used;
                }
            }

            self.speed.advance(n);
            self.amount.advance(n);
            offset += n;
        }

        let elapsed = start.elapsed();
        self.cpu.record(frames, elapsed);
        let accuracy = self.channels[0].estimator.quick_estimate().confidence;
        self.selector.update_performance_metrics(
            self.cpu.average_percent(),
            elapsed.as_secs_f32() * 1000.0,
            accuracy,
        );
        report.cpu_percent = self.cpu.average_percent();
        report
    }

    /// Re-derive processing settings after a mode or quality change.
    fn apply_mode(&mut self) {
        let current = (self.selector.current_mode(), self.selector.quality());
        if self.applied == Some(current) {
            return;
        }
        self.applied = Some(current);
        self.params = processing_params(current.0, current.1);

        let estimator = estimator_config(current.0, &self.params, self.config.fusion_weights);
        for channel in &mut self.channels {
            channel.estimator.set_config(estimator);
            channel
                .shifter
                .set_formant_correction(self.params.enable_formant_correction);
        }
        if current.0 != Mode::Ai {
            self.ai_pitch = 0.0;
        }
    }

    /// Queue `input` for inference and take the latest confident prediction.
    fn poll_ai(&mut self, input: &[f32]) -> Option<AiFrame> {
        let ai = self.ai.as_mut()?;
        ai.link.push(input);

        let prediction = ai.link.latest();
        if !prediction.is_usable(self.config.ai_confidence_threshold) {
            return None;
        }

        let smoothing = self.params.smoothing_factor;
        self.ai_pitch = if self.ai_pitch > 0.0 {
            smoothing * self.ai_pitch + (1.0 - smoothing) * prediction.frequency
        } else {
            prediction.frequency
        };

        Some(AiFrame {
            pitch: self.ai_pitch,
            confidence: prediction.confidence.clamp(0.0, 1.0),
            harmonics: prediction.harmonics.clone(),
        })
    }
}

impl Drop for CorrectionEngine {
    fn drop(&mut self) {
        self.detach_ai();
    }
}

impl std::fmt::Debug for CorrectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionEngine")
            .field("config", &self.config)
            .field("sample_rate", &self.sample_rate)
            .field("block_size", &self.block_size)
            .field("mode", &self.selector.current_mode())
            .field("ai_attached", &self.ai.is_some())
            .finish()
    }
}
