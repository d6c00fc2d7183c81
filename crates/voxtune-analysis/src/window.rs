//! Analysis windows and precomputed taper tables.

use std::f32::consts::PI;

/// Smallest window any detector accepts.
pub const MIN_WINDOW: usize = 64;

/// Largest analysis window the estimator keeps history for.
pub const MAX_WINDOW: usize = 4096;

/// A borrowed run of the most recent samples plus its sample rate.
///
/// Recreated every hop; detectors never retain it.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisWindow<'a> {
    samples: &'a [f32],
    sample_rate: f64,
}

impl<'a> AnalysisWindow<'a> {
    pub fn new(samples: &'a [f32], sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[inline]
    pub fn samples(&self) -> &'a [f32] {
        self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level of the window.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_sq / self.samples.len() as f64).sqrt() as f32
    }
}

/// Periodic Hann window of `size` samples.
pub fn hann(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Largest power of two that is `<= n` (0 for 0).
#[inline]
pub fn floor_power_of_two(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// Hann tables for every power-of-two length from [`MIN_WINDOW`] up to a maximum.
///
/// Lets detectors taper windows of varying length without evaluating
/// trigonometric functions on the audio thread.
#[derive(Debug, Clone)]
pub struct WindowBank {
    tables: Vec<Vec<f32>>,
}

impl WindowBank {
    pub fn hann(max_size: usize) -> Self {
        let max_size = floor_power_of_two(max_size.max(MIN_WINDOW));
        let mut tables = Vec::new();
        let mut size = MIN_WINDOW;
        while size <= max_size {
            tables.push(hann(size));
            size *= 2;
        }
        Self { tables }
    }

    /// Table for a power-of-two `size`, if one was built.
    #[inline]
    pub fn get(&self, size: usize) -> Option<&[f32]> {
        if !size.is_power_of_two() || size < MIN_WINDOW {
            return None;
        }
        let index = (size.trailing_zeros() - MIN_WINDOW.trailing_zeros()) as usize;
        self.tables.get(index).map(Vec::as_slice)
    }

    pub fn max_size(&self) -> usize {
        self.tables.last().map_or(0, Vec::len)
    }
}
