//! Tolerance constants for correction tests.

/// Floating point rounding errors.
/// Use for operations that should be mathematically exact.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// Pitch agreement (~1/20 semitone).
pub const PITCH_TOLERANCE_CENTS: f32 = 5.0;
