//! Correction modes, quality levels and the mode state machine.
//!
//! Each [`Mode`] has a static [`ModeConfig`] describing its character, and
//! [`processing_params`] derives the analysis settings for a mode at a given
//! [`QualityLevel`]. [`ModeSelector`] owns the active mode and admits
//! switches only when the cooldown has elapsed and the measured performance
//! allows the new mode.
//!
//! ## Switching rules
//!
//! - At least [`SWITCH_COOLDOWN`] between accepted switches
//! - AI needs CPU usage at or below [`AI_MAX_CPU_PERCENT`]
//! - Hard needs latency at or below [`HARD_MAX_LATENCY_MS`]
//!
//! A rejected switch leaves the mode unchanged. Nothing retries it; the
//! caller asks again once conditions change.

use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use voxtune_analysis::PitchAlgorithm;

/// Minimum time between accepted mode switches.
pub const SWITCH_COOLDOWN: Duration = Duration::from_millis(100);

/// AI mode is refused above this CPU usage.
pub const AI_MAX_CPU_PERCENT: f32 = 70.0;

/// Hard mode is refused above this latency.
pub const HARD_MAX_LATENCY_MS: f32 = 20.0;

/// CPU usage above which the engine is not considered real-time capable.
pub const REAL_TIME_MAX_CPU_PERCENT: f32 = 80.0;

/// Correction character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Mode {
    /// Smooth, natural correction.
    #[default]
    Classic,
    /// Immediate snapping to the target note.
    Hard,
    /// Formant-preserving correction, model-assisted when a model is attached.
    Ai,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Classic, Mode::Hard, Mode::Ai];

    pub fn from_index(index: usize) -> Option<Mode> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn config(self) -> &'static ModeConfig {
        &MODE_CONFIGS[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.config().name
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Analysis quality, trading CPU for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum QualityLevel {
    Draft,
    Good,
    #[default]
    High,
    Ultra,
}

impl QualityLevel {
    pub const ALL: [QualityLevel; 4] = [
        QualityLevel::Draft,
        QualityLevel::Good,
        QualityLevel::High,
        QualityLevel::Ultra,
    ];
}

/// Static description of a mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeConfig {
    pub name: &'static str,
    pub description: &'static str,
    /// Speed preset, percent.
    pub default_speed: f32,
    /// Amount preset, percent.
    pub default_amount: f32,
    pub use_formant_preservation: bool,
    pub use_advanced_detection: bool,
    pub use_high_quality_stretch: bool,
    /// Latency the mode is designed for.
    pub latency_budget_ms: f32,
}

/// Mode table, indexed by [`Mode::index`].
pub const MODE_CONFIGS: [ModeConfig; 3] = [
    ModeConfig {
        name: "Classic",
        description: "Traditional smooth pitch correction with natural sound",
        default_speed: 50.0,
        default_amount: 50.0,
        use_formant_preservation: false,
        use_advanced_detection: false,
        use_high_quality_stretch: false,
        latency_budget_ms: 8.0,
    },
    ModeConfig {
        name: "Hard",
        description: "Aggressive pitch correction with immediate snapping",
        default_speed: 90.0,
        default_amount: 85.0,
        use_formant_preservation: false,
        use_advanced_detection: true,
        use_high_quality_stretch: false,
        latency_budget_ms: 5.0,
    },
    ModeConfig {
        name: "AI",
        description: "AI-powered natural correction with formant preservation",
        default_speed: 25.0,
        default_amount: 60.0,
        use_formant_preservation: true,
        use_advanced_detection: true,
        use_high_quality_stretch: true,
        latency_budget_ms: 15.0,
    },
];

/// Analysis and correction settings for one (mode, quality) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingParams {
    /// Mode default speed relative to 50%.
    pub speed_multiplier: f32,
    /// Mode default amount relative to 50%.
    pub amount_multiplier: f32,
    /// Weight of the previous value when smoothing external predictions.
    pub smoothing_factor: f32,
    pub window_size: usize,
    pub hop_size: usize,
    pub enable_formant_correction: bool,
    pub enable_harmonic_analysis: bool,
}

/// Derive processing settings. Pure.
pub fn processing_params(mode: Mode, quality: QualityLevel) -> ProcessingParams {
    let config = mode.config();
    let (smoothing_factor, window_size, hop_size, formant, harmonic) = match mode {
        Mode::Classic => (0.8, 2048, 512, false, false),
        Mode::Hard => (0.2, 1024, 256, false, true),
        Mode::Ai => (0.9, 4096, 1024, true, true),
    };

    let mut params = ProcessingParams {
        speed_multiplier: config.default_speed / 50.0,
        amount_multiplier: config.default_amount / 50.0,
        smoothing_factor,
        window_size,
        hop_size,
        enable_formant_correction: formant,
        enable_harmonic_analysis: harmonic,
    };

    match quality {
        QualityLevel::Draft => {
            params.window_size /= 2;
            params.hop_size /= 2;
            params.enable_formant_correction = false;
        }
        QualityLevel::Good => {}
        QualityLevel::High => {
            if mode == Mode::Ai {
                params.smoothing_factor = (params.smoothing_factor * 1.1).min(0.95);
            }
        }
        QualityLevel::Ultra => {
            params.window_size *= 2;
            params.enable_formant_correction = true;
            params.enable_harmonic_analysis = true;
            params.smoothing_factor = (params.smoothing_factor * 1.2).min(0.95);
        }
    }

    params
}

/// Detection strategy a mode is designed around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    Single(PitchAlgorithm),
    /// Weighted fusion of every enabled detector.
    Combined,
}

pub fn pitch_algorithm(mode: Mode) -> DetectionStrategy {
    match mode {
        Mode::Classic => DetectionStrategy::Single(PitchAlgorithm::Autocorrelation),
        Mode::Hard => DetectionStrategy::Single(PitchAlgorithm::Yin),
        Mode::Ai => DetectionStrategy::Combined,
    }
}

/// Why a mode switch was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModeError {
    #[error("Mode switch too soon: {remaining:?} of cooldown left")]
    Cooldown { remaining: Duration },

    #[error("Invalid mode index: {0}")]
    InvalidMode(usize),

    #[error("Cannot switch to {mode}: CPU usage {cpu_percent:.1}% exceeds {limit}%", limit = AI_MAX_CPU_PERCENT)]
    CpuTooHigh { mode: Mode, cpu_percent: f32 },

    #[error("Cannot switch to {mode}: latency {latency_ms:.1} ms exceeds {limit} ms", limit = HARD_MAX_LATENCY_MS)]
    LatencyTooHigh { mode: Mode, latency_ms: f32 },
}

/// An accepted switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeEvent {
    Changed { from: Mode, to: Mode },
    Rejected { requested: Mode, error: ModeError },
}

/// Last measured performance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceMetrics {
    pub cpu_percent: f32,
    pub latency_ms: f32,
    /// Detection confidence, 0-1.
    pub accuracy: f32,
    pub real_time_capable: bool,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            cpu_percent: 0.0,
            latency_ms: 0.0,
            accuracy: 0.0,
            real_time_capable: true,
        }
    }
}

/// Owner of the active mode and quality level.
#[derive(Debug)]
pub struct ModeSelector {
    current: Mode,
    quality: QualityLevel,
    metrics: PerformanceMetrics,
    last_switch: Option<Instant>,
    subscribers: Vec<Sender<ModeEvent>>,
}

impl ModeSelector {
    pub fn new() -> Self {
        Self::with_mode(Mode::Classic)
    }

    pub fn with_mode(mode: Mode) -> Self {
        Self {
            current: mode,
            quality: QualityLevel::default(),
            metrics: PerformanceMetrics::default(),
            last_switch: None,
            subscribers: Vec::new(),
        }
    }

    #[inline]
    pub fn current_mode(&self) -> Mode {
        self.current
    }

    pub fn current_config(&self) -> &'static ModeConfig {
        self.current.config()
    }

    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    pub fn set_quality(&mut self, quality: QualityLevel) {
        self.quality = quality;
    }

    /// Settings for the active mode and quality.
    pub fn processing_params(&self) -> ProcessingParams {
        processing_params(self.current, self.quality)
    }

    pub fn mode_names(&self) -> [&'static str; 3] {
        Mode::ALL.map(Mode::name)
    }

    /// Receive future [`ModeEvent`]s. Events beyond `capacity` unread are dropped.
    pub fn subscribe(&mut self, capacity: usize) -> Receiver<ModeEvent> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.push(tx);
        rx
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }

    /// Record new measurements and recompute real-time capability for the active mode.
    pub fn update_performance_metrics(&mut self, cpu_percent: f32, latency_ms: f32, accuracy: f32) {
        let budget = self.current.config().latency_budget_ms;
        self.metrics = PerformanceMetrics {
            cpu_percent,
            latency_ms,
            accuracy,
            real_time_capable: latency_ms <= budget * 1.5
                && cpu_percent <= REAL_TIME_MAX_CPU_PERCENT,
        };
    }

    /// Check the gates for `mode` at `now` without switching.
    pub fn can_switch_to_mode_at(&self, mode: Mode, now: Instant) -> Result<(), ModeError> {
        if let Some(last) = self.last_switch {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < SWITCH_COOLDOWN {
                return Err(ModeError::Cooldown {
                    remaining: SWITCH_COOLDOWN - elapsed,
                });
            }
        }

        match mode {
            Mode::Ai if self.metrics.cpu_percent > AI_MAX_CPU_PERCENT => {
                Err(ModeError::CpuTooHigh {
                    mode,
                    cpu_percent: self.metrics.cpu_percent,
                })
            }
            Mode::Hard if self.metrics.latency_ms > HARD_MAX_LATENCY_MS => {
                Err(ModeError::LatencyTooHigh {
                    mode,
                    latency_ms: self.metrics.latency_ms,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn can_switch_to_mode(&self, mode: Mode) -> Result<(), ModeError> {
        self.can_switch_to_mode_at(mode, Instant::now())
    }

    /// Request a switch to `mode`.
    ///
    /// `Ok(None)` when `mode` is already active.
    pub fn switch_to_mode(&mut self, mode: Mode) -> Result<Option<ModeTransition>, ModeError> {
        self.switch_to_mode_at(mode, Instant::now())
    }

    /// Request a switch by control-surface index.
    pub fn switch_to_index(&mut self, index: usize) -> Result<Option<ModeTransition>, ModeError> {
        match Mode::from_index(index) {
            Some(mode) => self.switch_to_mode(mode),
            None => Err(ModeError::InvalidMode(index)),
        }
    }

    /// [`switch_to_mode`](Self::switch_to_mode) with an explicit clock.
    pub fn switch_to_mode_at(
        &mut self,
        mode: Mode,
        now: Instant,
    ) -> Result<Option<ModeTransition>, ModeError> {
        if mode == self.current {
            return Ok(None);
        }

        if let Err(error) = self.can_switch_to_mode_at(mode, now) {
            tracing::warn!("Mode switch to {} rejected: {}", mode, error);
            self.publish(ModeEvent::Rejected {
                requested: mode,
                error: error.clone(),
            });
            return Err(error);
        }

        let transition = ModeTransition {
            from: self.current,
            to: mode,
        };
        self.current = mode;
        self.last_switch = Some(now);
        tracing::info!("Mode changed: {} -> {}", transition.from, transition.to);
        self.publish(ModeEvent::Changed {
            from: transition.from,
            to: transition.to,
        });
        Ok(Some(transition))
    }

    fn publish(&mut self, event: ModeEvent) {
        self.subscribers.retain(|tx| {
            !matches!(
                tx.try_send(event.clone()),
                Err(crossbeam_channel::TrySendError::Disconnected(_))
            )
        });
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self::new()
    }
}
