//! Parameter ranges for the correction control surface.
//!
//! The control surface exposes five values: correction speed and amount as
//! percentages, and key, scale and mode as integer indices. Hosts automate
//! them as normalized `0.0..=1.0` values; this module converts between the
//! two.
//!
//! # Example
//!
//! ```
//! use voxtune_core::ParameterRange;
//!
//! let speed = ParameterRange::percent(50.0);
//! assert_eq!(speed.denormalize(0.25), 25.0);
//!
//! let key = ParameterRange::integer(0, 11, 0);
//! assert_eq!(key.index(key.denormalize(0.5)), 6);
//! ```

/// How a parameter value is scaled between normalized (0-1) and real values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ParameterScale {
    /// `real = min + normalized * (max - min)`
    #[default]
    Linear,

    /// Values are quantized to integers between `min` and `max`.
    Integer,
}

/// Valid range and default of one control parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    /// Default real value, clamped into range on construction.
    pub default: f32,
    pub scale: ParameterScale,
}

impl ParameterRange {
    pub fn new(min: f32, max: f32, default: f32, scale: ParameterScale) -> Self {
        debug_assert!(max > min, "max must be greater than min");

        Self {
            min,
            max,
            default: default.clamp(min, max),
            scale,
        }
    }

    pub fn linear(min: f32, max: f32, default: f32) -> Self {
        Self::new(min, max, default, ParameterScale::Linear)
    }

    /// A `0..=100` percentage.
    pub fn percent(default: f32) -> Self {
        Self::linear(0.0, 100.0, default)
    }

    pub fn integer(min: i32, max: i32, default: i32) -> Self {
        Self::new(
            min as f32,
            max as f32,
            default as f32,
            ParameterScale::Integer,
        )
    }

    /// Convert a real value to normalized (0.0-1.0).
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        let range = self.max - self.min;

        if range <= 0.0 {
            return 0.0;
        }

        match self.scale {
            ParameterScale::Linear => (value - self.min) / range,
            ParameterScale::Integer => (value.round() - self.min) / range,
        }
    }

    /// Convert a normalized value (0.0-1.0) to a real value.
    #[inline]
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let continuous = self.min + normalized * (self.max - self.min);

        match self.scale {
            ParameterScale::Linear => continuous,
            ParameterScale::Integer => continuous.round(),
        }
    }

    /// Clamp a real value to this parameter's range. NaN maps to the default.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    /// Clamp and round a real value to a zero-based index from `min`.
    #[inline]
    pub fn index(&self, value: f32) -> usize {
        (self.clamp(value).round() - self.min.round()).max(0.0) as usize
    }

    #[inline]
    pub fn default_normalized(&self) -> f32 {
        self.normalize(self.default)
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for ParameterRange {
    fn default() -> Self {
        Self::linear(0.0, 1.0, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_percent_normalize_denormalize() {
        let range = ParameterRange::percent(50.0);

        assert_abs_diff_eq!(range.normalize(0.0), 0.0);
        assert_abs_diff_eq!(range.normalize(50.0), 0.5);
        assert_abs_diff_eq!(range.normalize(100.0), 1.0);
        assert_abs_diff_eq!(range.denormalize(0.5), 50.0);
        assert_abs_diff_eq!(range.default_normalized(), 0.5);
    }

    #[test]
    fn test_out_of_range_clamps() {
        let range = ParameterRange::percent(50.0);
        assert_abs_diff_eq!(range.normalize(250.0), 1.0);
        assert_abs_diff_eq!(range.denormalize(-1.0), 0.0);
        assert_abs_diff_eq!(range.clamp(f32::NAN), 50.0);
        assert!(!range.contains(100.5));
    }

    #[test]
    fn test_integer() {
        let range = ParameterRange::integer(0, 11, 0);

        assert_abs_diff_eq!(range.denormalize(0.0), 0.0);
        assert_abs_diff_eq!(range.denormalize(1.0), 11.0);
        // 0.15 * 11 = 1.65 rounds to 2
        assert_abs_diff_eq!(range.denormalize(0.15), 2.0);
        assert_eq!(range.index(4.4), 4);
        assert_eq!(range.index(99.0), 11);
        assert_eq!(range.index(-3.0), 0);
    }

    #[test]
    fn test_default_clamped() {
        let range = ParameterRange::integer(0, 2, 7);
        assert_abs_diff_eq!(range.default, 2.0);
    }

    proptest! {
        #[test]
        fn prop_linear_roundtrip(value in 0.0f32..=100.0) {
            let range = ParameterRange::percent(50.0);
            let back = range.denormalize(range.normalize(value));
            prop_assert!((back - value).abs() < 1e-3);
        }

        #[test]
        fn prop_integer_index_in_range(normalized in -1.0f32..2.0) {
            let range = ParameterRange::integer(0, 11, 0);
            let idx = range.index(range.denormalize(normalized));
            prop_assert!(idx <= 11);
        }
    }
}
