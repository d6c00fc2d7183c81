//! # voxtune-shift
//!
//! In-place pitch shifting engines for vocal correction.
//!
//! - **Granular**: windowed, resampled grains blended with the dry signal
//! - **Hard**: a two-tap sinc delay line for instant, robotic snapping
//! - **Formant-aware**: a streaming [`PitchStretcher`] that keeps formants in
//!   place, with [`SpectralStretcher`] as the built-in phase vocoder
//!
//! [`PitchShifter`] owns one of each and dispatches by [`ShiftStrategy`].
//!
//! ## Example
//!
//! ```rust
//! use voxtune_shift::{PitchShifter, ShiftStrategy};
//!
//! let mut shifter = PitchShifter::new(44100.0, 512).unwrap();
//! let mut block: Vec<f32> = (0..512)
//!     .map(|i| (2.0 * std::f32::consts::PI * 233.0 * i as f32 / 44100.0).sin())
//!     .collect();
//!
//! // Pull A#3 down to A3
//! assert!(shifter.shift(ShiftStrategy::Hard, &mut block, 233.08, 220.0, 1.0));
//!
//! // Same pitch: untouched
//! assert!(!shifter.shift(ShiftStrategy::Granular, &mut block, 220.0, 220.0, 1.0));
//! ```

pub mod formant;
pub mod granular;
pub mod hard;
pub mod shifter;
pub mod stretcher;

pub use formant::FormantShifter;
pub use granular::{Grain, GranularShifter};
pub use hard::HardQuantizer;
pub use shifter::{pitch_ratio, PitchShifter, ShiftStrategy, MIN_RATIO_DEVIATION};
pub use stretcher::{PitchStretcher, SpectralStretcher};
