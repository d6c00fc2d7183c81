//! Processing-load tracking for `process_block`.
//!
//! Load is elapsed processing time divided by the real-time duration of the
//! block. The averaged value drives mode admission (the AI mode is refused
//! above 70%).

use crate::AtomicFloat;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// CPU metrics snapshot. Percentages are `0..=100` (can exceed 100 on overrun).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CpuMetrics {
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    pub overruns: u64,
    pub block_size: usize,
    pub budget_us: f64,
    pub actual_us: f64,
}

/// Lock-free CPU meter; readable from any thread while the audio thread records.
#[derive(Debug)]
pub struct CpuMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    overruns: AtomicU64,
    blocks: AtomicU32,
    sample_rate: f64,
}

impl CpuMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            current: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            average: AtomicFloat::new(0.0),
            overruns: AtomicU64::new(0),
            blocks: AtomicU32::new(0),
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    /// Record one processed block of `block_size` samples.
    pub fn record(&self, block_size: usize, elapsed: Duration) {
        if block_size == 0 || self.sample_rate <= 0.0 {
            return;
        }

        let budget = block_size as f64 / self.sample_rate;
        let load = (elapsed.as_secs_f64() / budget) as f32;

        self.current.set(load);

        if load > self.peak.get() {
            self.peak.set(load);
        }

        // EMA that warms up over the first 100 blocks
        let count = self.blocks.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        if elapsed.as_secs_f64() > budget {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self, block_size: usize) -> CpuMetrics {
        let budget_us = (block_size as f64 / self.sample_rate) * 1_000_000.0;
        let actual_us = (self.current.get() as f64) * budget_us;

        CpuMetrics {
            average: self.average_percent(),
            peak: self.peak.get() * 100.0,
            current: self.current.get() * 100.0,
            overruns: self.overruns(),
            block_size,
            budget_us,
            actual_us,
        }
    }

    pub fn average_percent(&self) -> f32 {
        self.average.get() * 100.0
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.overruns.store(0, Ordering::Relaxed);
        self.blocks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_half_budget_is_fifty_percent() {
        let meter = CpuMeter::new(48000.0);
        // 480 samples at 48k = 10ms budget
        meter.record(480, Duration::from_millis(5));

        let m = meter.metrics(480);
        assert_relative_eq!(m.current, 50.0, epsilon = 0.01);
        assert_relative_eq!(m.average, 50.0, epsilon = 0.01);
        assert_relative_eq!(m.budget_us, 10_000.0, epsilon = 1e-6);
        assert_eq!(m.overruns, 0);
    }

    #[test]
    fn test_overrun_counted() {
        let meter = CpuMeter::new(48000.0);
        meter.record(480, Duration::from_millis(12));
        assert_eq!(meter.overruns(), 1);
        assert!(meter.metrics(480).peak > 100.0);
    }

    #[test]
    fn test_average_tracks_recent_load() {
        let meter = CpuMeter::new(1000.0);
        for _ in 0..200 {
            meter.record(100, Duration::from_millis(20));
        }
        assert_relative_eq!(meter.average_percent(), 20.0, epsilon = 0.1);
    }

    #[test]
    fn test_reset() {
        let mut meter = CpuMeter::new(44100.0);
        meter.record(441, Duration::from_millis(20));
        meter.set_sample_rate(48000.0);
        assert_eq!(meter.average_percent(), 0.0);
        assert_eq!(meter.overruns(), 0);
    }

    #[test]
    fn test_zero_block_ignored() {
        let meter = CpuMeter::new(44100.0);
        meter.record(0, Duration::from_millis(1));
        assert_eq!(meter.metrics(0).current, 0.0);
    }
}
