//! Control parameters.
//!
//! [`ControlParams`] is the shared, lock-free cell set a control thread
//! writes. The audio thread takes a [`ParameterSet`] snapshot once per block
//! and hands it to the engine, which ramps speed and amount itself.

use crate::mode::Mode;
use std::sync::atomic::{AtomicU8, Ordering};
use voxtune_analysis::{Key, Scale};
use voxtune_core::{AtomicFloat, ParameterRange};

/// Control-surface parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    Speed,
    Amount,
    Key,
    Scale,
    Mode,
}

impl ParamId {
    pub const ALL: [ParamId; 5] = [
        ParamId::Speed,
        ParamId::Amount,
        ParamId::Key,
        ParamId::Scale,
        ParamId::Mode,
    ];

    /// Stable identifier for automation and presets.
    pub fn id(self) -> &'static str {
        match self {
            ParamId::Speed => "speed",
            ParamId::Amount => "amount",
            ParamId::Key => "key",
            ParamId::Scale => "scale",
            ParamId::Mode => "mode",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamId::Speed => "Speed",
            ParamId::Amount => "Amount",
            ParamId::Key => "Key",
            ParamId::Scale => "Scale",
            ParamId::Mode => "Mode",
        }
    }

    pub fn range(self) -> ParameterRange {
        match self {
            ParamId::Speed | ParamId::Amount => ParameterRange::percent(50.0),
            ParamId::Key => ParameterRange::integer(0, 11, 0),
            ParamId::Scale => ParameterRange::integer(0, 2, 0),
            ParamId::Mode => ParameterRange::integer(0, 2, 0),
        }
    }
}

/// Plain parameter values consumed by [`CorrectionEngine::process_block`](crate::CorrectionEngine::process_block).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ParameterSet {
    /// Correction speed, percent.
    pub speed: f32,
    /// Correction amount, percent.
    pub amount: f32,
    pub key: Key,
    pub scale: Scale,
    pub mode: Mode,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            speed: 50.0,
            amount: 50.0,
            key: Key::C,
            scale: Scale::Major,
            mode: Mode::Classic,
        }
    }
}

impl ParameterSet {
    /// `mode` with its preset speed and amount.
    pub fn for_mode(mode: Mode) -> Self {
        let config = mode.config();
        Self {
            speed: config.default_speed,
            amount: config.default_amount,
            mode,
            ..Self::default()
        }
    }

    /// Copy with speed and amount clamped into range (NaN becomes the default).
    pub fn sanitized(&self) -> Self {
        Self {
            speed: ParamId::Speed.range().clamp(self.speed),
            amount: ParamId::Amount.range().clamp(self.amount),
            ..*self
        }
    }
}

/// Lock-free parameter cells shared between control and audio threads.
#[derive(Debug)]
pub struct ControlParams {
    speed: AtomicFloat,
    amount: AtomicFloat,
    key: AtomicU8,
    scale: AtomicU8,
    mode: AtomicU8,
}

impl ControlParams {
    pub fn new() -> Self {
        Self::from_set(&ParameterSet::default())
    }

    pub fn from_set(set: &ParameterSet) -> Self {
        let params = Self {
            speed: AtomicFloat::new(0.0),
            amount: AtomicFloat::new(0.0),
            key: AtomicU8::new(0),
            scale: AtomicU8::new(0),
            mode: AtomicU8::new(0),
        };
        params.store(set);
        params
    }

    pub fn set_speed(&self, percent: f32) {
        self.speed.set(ParamId::Speed.range().clamp(percent));
    }

    pub fn set_amount(&self, percent: f32) {
        self.amount.set(ParamId::Amount.range().clamp(percent));
    }

    pub fn set_key(&self, key: Key) {
        self.key.store(key.offset(), Ordering::Release);
    }

    pub fn set_scale(&self, scale: Scale) {
        self.scale.store(scale as u8, Ordering::Release);
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode.index() as u8, Ordering::Release);
    }

    /// Write every cell from `set`.
    pub fn store(&self, set: &ParameterSet) {
        self.set_speed(set.speed);
        self.set_amount(set.amount);
        self.set_key(set.key);
        self.set_scale(set.scale);
        self.set_mode(set.mode);
    }

    /// Set a parameter from a normalized `0.0..=1.0` value.
    pub fn set_normalized(&self, id: ParamId, normalized: f32) {
        let range = id.range();
        let value = range.denormalize(normalized);
        match id {
            ParamId::Speed => self.set_speed(value),
            ParamId::Amount => self.set_amount(value),
            ParamId::Key => self.key.store(range.index(value) as u8, Ordering::Release),
            ParamId::Scale => self.scale.store(range.index(value) as u8, Ordering::Release),
            ParamId::Mode => self.mode.store(range.index(value) as u8, Ordering::Release),
        }
    }

    /// Current value of a parameter, normalized.
    pub fn normalized(&self, id: ParamId) -> f32 {
        let set = self.snapshot();
        let value = match id {
            ParamId::Speed => set.speed,
            ParamId::Amount => set.amount,
            ParamId::Key => set.key.offset() as f32,
            ParamId::Scale => set.scale as u8 as f32,
            ParamId::Mode => set.mode.index() as f32,
        };
        id.range().normalize(value)
    }

    /// Read every cell. Never blocks.
    #[inline]
    pub fn snapshot(&self) -> ParameterSet {
        ParameterSet {
            speed: self.speed.get(),
            amount: self.amount.get(),
            key: Key::from_index(self.key.load(Ordering::Acquire) as usize).unwrap_or_default(),
            scale: Scale::from_index(self.scale.load(Ordering::Acquire) as usize)
                .unwrap_or_default(),
            mode: Mode::from_index(self.mode.load(Ordering::Acquire) as usize)
                .unwrap_or_default(),
        }
    }
}

impl Default for ControlParams {
    fn default() -> Self {
        Self::new()
    }
}
