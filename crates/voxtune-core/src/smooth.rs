//! Linear parameter ramps for correction speed and amount.
//!
//! Control values arrive as plain numbers from another thread. Jumping
//! straight to a new value causes audible steps in the corrected signal, so
//! every parameter the engine reads is ramped toward its target.
//!
//! # Example
//!
//! ```
//! use voxtune_core::SmoothedValue;
//!
//! // 50ms ramp at 48kHz
//! let mut speed = SmoothedValue::new(0.5, 0.050, 48000.0);
//! speed.set_target(1.0);
//!
//! // Per sample
//! let first = speed.next_sample();
//! assert!(first > 0.5 && first < 1.0);
//!
//! // Or per run of samples
//! let later = speed.advance(4800);
//! assert!((later - 1.0).abs() < 1e-6);
//! ```

/// Linearly ramped value.
///
/// `next_sample()` steps one sample; `advance(n)` steps `n` samples at once
/// for callers that only need the value at run boundaries.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    step: f32,
    samples_remaining: u32,
    smooth_samples: u32,
}

impl SmoothedValue {
    pub fn new(initial: f32, smooth_time_secs: f32, sample_rate: f32) -> Self {
        let smooth_samples = (smooth_time_secs * sample_rate).max(1.0) as u32;

        Self {
            current: initial,
            target: initial,
            step: 0.0,
            samples_remaining: 0,
            smooth_samples,
        }
    }

    pub fn immediate(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            samples_remaining: 0,
            smooth_samples: 1,
        }
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if (target - self.target).abs() < f32::EPSILON {
            return;
        }

        self.target = target;
        self.samples_remaining = self.smooth_samples;
        self.step = (self.target - self.current) / self.samples_remaining as f32;
    }

    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.samples_remaining = 0;
    }

    /// Call once per sample in the audio callback.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        if self.samples_remaining > 0 {
            self.current += self.step;
            self.samples_remaining -= 1;

            // Snap to avoid drift
            if self.samples_remaining == 0 {
                self.current = self.target;
            }
        }

        self.current
    }

    /// Step `samples` samples at once and return the resulting value.
    #[inline]
    pub fn advance(&mut self, samples: usize) -> f32 {
        if self.samples_remaining == 0 || samples == 0 {
            return self.current;
        }

        let n = samples.min(self.samples_remaining as usize) as u32;
        self.samples_remaining -= n;
        if self.samples_remaining == 0 {
            self.current = self.target;
        } else {
            self.current += self.step * n as f32;
        }

        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.samples_remaining > 0
    }

    #[inline]
    pub fn samples_remaining(&self) -> u32 {
        self.samples_remaining
    }

    /// Takes effect on the next `set_target()` call.
    pub fn set_smooth_time(&mut self, smooth_time_secs: f32, sample_rate: f32) {
        self.smooth_samples = (smooth_time_secs * sample_rate).max(1.0) as u32;
    }

    #[inline]
    pub fn skip_to_target(&mut self) {
        self.current = self.target;
        self.step = 0.0;
        self.samples_remaining = 0;
    }

    #[inline]
    pub fn process_block(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.next_sample();
        }
    }
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::new(0.0, 0.050, 44100.0)
    }
}
