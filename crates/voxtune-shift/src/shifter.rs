//! Strategy dispatch over the shifting engines.

use crate::formant::FormantShifter;
use crate::granular::GranularShifter;
use crate::hard::HardQuantizer;
use crate::stretcher::PitchStretcher;
use voxtune_core::{validate_stream, Result};

/// Ratios closer to 1.0 than this are left alone.
pub const MIN_RATIO_DEVIATION: f32 = 0.001;

/// Resynthesis engine used for a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShiftStrategy {
    /// Overlap-add grains; smooth correction.
    #[default]
    Granular,
    /// Two-tap sinc delay line; instant snapping.
    Hard,
    /// External stretcher with formant preservation, granular fallback.
    FormantAware,
}

/// Ratio `target / current`, or `None` when no shift should happen.
pub fn pitch_ratio(current_pitch: f32, target_pitch: f32) -> Option<f32> {
    if !(current_pitch > 0.0 && target_pitch > 0.0) {
        return None;
    }
    let ratio = target_pitch / current_pitch;
    if !ratio.is_finite() || ratio == 1.0 || (ratio - 1.0).abs() < MIN_RATIO_DEVIATION {
        return None;
    }
    Some(ratio)
}

/// Owns one instance of every engine so state never leaks between shifters.
///
/// The hard quantizer records every block it is handed, shifted or not, so
/// its delay line is continuous when the strategy changes.
#[derive(Debug)]
pub struct PitchShifter {
    granular: GranularShifter,
    hard: HardQuantizer,
    formant: FormantShifter,
    sample_rate: f64,
    max_block: usize,
}

impl PitchShifter {
    pub fn new(sample_rate: f64, max_block: usize) -> Result<Self> {
        validate_stream(sample_rate, max_block)?;
        Ok(Self {
            granular: GranularShifter::new(max_block),
            hard: HardQuantizer::new(sample_rate)?,
            formant: FormantShifter::new(max_block),
            sample_rate,
            max_block,
        })
    }

    /// Resize every engine. Not real-time safe.
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize) -> Result<()> {
        validate_stream(sample_rate, max_block)?;
        self.granular.prepare(max_block);
        self.hard.set_sample_rate(sample_rate)?;
        self.formant.prepare(max_block);
        self.sample_rate = sample_rate;
        self.max_block = max_block;
        tracing::debug!(
            "Pitch shifter prepared: {} Hz, {} samples",
            sample_rate,
            max_block
        );
        Ok(())
    }

    pub fn reset(&mut self) {
        self.hard.reset();
        self.formant.reset();
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Install or remove the formant-aware stretcher, returning the previous one.
    pub fn set_stretcher(
        &mut self,
        stretcher: Option<Box<dyn PitchStretcher>>,
    ) -> Option<Box<dyn PitchStretcher>> {
        if let Some(stretcher) = stretcher.as_ref() {
            tracing::info!(
                "Formant stretcher installed, latency {} samples",
                stretcher.latency_samples()
            );
        }
        self.formant.set_stretcher(stretcher)
    }

    pub fn set_formant_correction(&mut self, enabled: bool) {
        self.formant.set_formant_correction(enabled);
    }

    pub fn set_granular_blend(&mut self, blend: f32) {
        self.granular.set_blend(blend);
    }

    pub fn granular(&self) -> &GranularShifter {
        &self.granular
    }

    pub fn hard(&self) -> &HardQuantizer {
        &self.hard
    }

    pub fn formant(&self) -> &FormantShifter {
        &self.formant
    }

    /// Record input that was corrected elsewhere, keeping hard-mode history continuous.
    pub fn observe(&mut self, block: &[f32]) {
        self.hard.observe(block);
        self.formant.disengage();
    }

    /// Shift `block` in place from `current_pitch` toward `target_pitch`.
    ///
    /// Returns `false` when either pitch is unvoiced (≤ 0) or the ratio is
    /// within [`MIN_RATIO_DEVIATION`] of 1.0. The block is then left alone,
    /// except that [`ShiftStrategy::FormantAware`] with a stretcher installed
    /// still streams it through unshifted to keep the stretcher's delay.
    pub fn shift(
        &mut self,
        strategy: ShiftStrategy,
        block: &mut [f32],
        current_pitch: f32,
        target_pitch: f32,
        speed: f32,
    ) -> bool {
        if strategy != ShiftStrategy::FormantAware {
            self.formant.disengage();
        }

        let Some(ratio) = pitch_ratio(current_pitch, target_pitch) else {
            self.hard.observe(block);
            if strategy == ShiftStrategy::FormantAware {
                self.formant.pass_through(block);
            }
            return false;
        };

        match strategy {
            ShiftStrategy::Granular => {
                self.hard.observe(block);
                self.granular.process(block, ratio, speed);
            }
            ShiftStrategy::Hard => {
                self.hard.process(block, ratio, speed);
            }
            ShiftStrategy::FormantAware => {
                self.hard.observe(block);
                self.formant
                    .process(block, ratio, speed, &mut self.granular);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stretcher::SpectralStretcher;
    use std::f32::consts::PI;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect()
    }

    fn shifter() -> PitchShifter {
        PitchShifter::new(44100.0, 1024).unwrap()
    }

    const STRATEGIES: [ShiftStrategy; 3] = [
        ShiftStrategy::Granular,
        ShiftStrategy::Hard,
        ShiftStrategy::FormantAware,
    ];

    #[test]
    fn test_pitch_ratio_guards() {
        assert_eq!(pitch_ratio(0.0, 440.0), None);
        assert_eq!(pitch_ratio(440.0, 0.0), None);
        assert_eq!(pitch_ratio(-1.0, 440.0), None);
        assert_eq!(pitch_ratio(440.0, 440.0), None);
        assert_eq!(pitch_ratio(440.0, 440.2), None);
        assert_eq!(pitch_ratio(f32::NAN, 440.0), None);
        assert_eq!(pitch_ratio(220.0, 440.0), Some(2.0));
    }

    #[test]
    fn test_unit_ratio_is_noop() {
        let mut shifter = shifter();
        let input = sine(440.0, 1024);
        for strategy in STRATEGIES {
            let mut block = input.clone();
            assert!(!shifter.shift(strategy, &mut block, 440.0, 440.0, 1.0));
            assert_eq!(block, input, "{:?} modified the block", strategy);
        }
    }

    #[test]
    fn test_unvoiced_is_noop() {
        let mut shifter = shifter();
        let input = sine(300.0, 1024);
        for strategy in STRATEGIES {
            let mut block = input.clone();
            assert!(!shifter.shift(strategy, &mut block, 0.0, 261.6, 1.0));
            assert_eq!(block, input);
        }
    }

    #[test]
    fn test_silence_unchanged() {
        let mut shifter = shifter();
        for strategy in STRATEGIES {
            let mut block = vec![0.0; 1024];
            shifter.shift(strategy, &mut block, 233.0, 220.0, 1.0);
            assert!(block.iter().all(|&s| s == 0.0), "{:?}", strategy);
        }
    }

    #[test]
    fn test_each_strategy_modifies_block() {
        let input = sine(233.0, 1024);
        for strategy in STRATEGIES {
            let mut shifter = shifter();
            let mut block = input.clone();
            assert!(shifter.shift(strategy, &mut block, 233.0, 220.0, 1.0));
            assert_ne!(block, input, "{:?} left the block unchanged", strategy);
        }
    }

    #[test]
    fn test_hard_history_observed_on_noop() {
        let mut shifter = shifter();
        let mut block = sine(440.0, 512);
        shifter.shift(ShiftStrategy::Granular, &mut block, 440.0, 440.0, 1.0);
        assert_eq!(shifter.hard().samples_written(), 512);

        shifter.shift(ShiftStrategy::Granular, &mut block, 440.0, 415.3, 1.0);
        assert_eq!(shifter.hard().samples_written(), 1024);

        shifter.observe(&block);
        assert_eq!(shifter.hard().samples_written(), 1536);
    }

    #[test]
    fn test_other_strategy_disengages_stretcher() {
        let mut shifter = shifter();
        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(512))));

        let mut block = sine(233.0, 1024);
        shifter.shift(ShiftStrategy::FormantAware, &mut block, 233.0, 220.0, 1.0);
        assert!(shifter.formant().is_engaged());

        shifter.shift(ShiftStrategy::Hard, &mut block, 233.0, 220.0, 1.0);
        assert!(!shifter.formant().is_engaged());
    }

    #[test]
    fn test_stretcher_stream_continuous_across_in_tune_runs() {
        let mut shifter = shifter();
        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(512))));
        let mut reference = SpectralStretcher::new(512);
        let mut wet = vec![0.0; 256];

        let input = sine(233.0, 256 * 16);
        for (i, run) in input.chunks(256).enumerate() {
            // Off-tune and in-tune runs alternate
            let target = if i % 2 == 0 { 220.0 } else { 233.0 };
            let mut block = run.to_vec();
            shifter.shift(ShiftStrategy::FormantAware, &mut block, 233.0, target, 1.0);
            assert!(shifter.formant().is_engaged(), "run {}", i);

            // One uninterrupted stream with the same ratios
            reference.set_pitch_scale(target / 233.0);
            reference.process(run);
            let got = reference.retrieve(&mut wet);
            let mut expected = run.to_vec();
            expected[256 - got..].copy_from_slice(&wet[..got]);
            assert_eq!(block, expected, "run {}", i);
        }
    }

    #[test]
    fn test_unvoiced_run_keeps_stretcher_engaged() {
        let mut shifter = shifter();
        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(512))));

        let mut block = sine(233.0, 1024);
        shifter.shift(ShiftStrategy::FormantAware, &mut block, 233.0, 220.0, 1.0);
        let mut gap = sine(233.0, 256);
        assert!(!shifter.shift(ShiftStrategy::FormantAware, &mut gap, 0.0, 0.0, 1.0));
        assert!(shifter.formant().is_engaged());

        shifter.reset();
        assert!(!shifter.formant().is_engaged());
    }

    #[test]
    fn test_prepare_validates() {
        let mut shifter = shifter();
        assert!(shifter.prepare(0.0, 512).is_err());
        assert!(shifter.prepare(48000.0, 0).is_err());
        shifter.prepare(48000.0, 2048).unwrap();
        assert_eq!(shifter.max_block(), 2048);
        assert_eq!(shifter.hard().sweep_samples(), 1200);
    }
}
