//! Formant-aware pitch shifting.
//!
//! With a [`PitchStretcher`] installed the block is streamed through it with
//! the formant scale held at 1.0. The stretcher's output lags its input, so a
//! call may get back fewer samples than it fed in; those go at the end of the
//! block and the head keeps the dry signal. Runs that need no shift are
//! still streamed at unit ratio, so once engaged the output stays delayed by
//! the stretcher's latency until the strategy changes or the shifter resets.
//!
//! Without a stretcher the shift falls back to the granular engine, preceded
//! by a gain compensation `1 - (ratio - 1) · 0.3` when formant correction is
//! enabled.

use crate::granular::GranularShifter;
use crate::stretcher::PitchStretcher;

/// Input fed to the stretcher between retrievals.
const FEED_CHUNK: usize = 256;

/// Gain slope of the fallback compensation.
pub const COMPENSATION_SLOPE: f32 = 0.3;

/// Apply the fallback compensation gain for `ratio`.
pub fn compensate(block: &mut [f32], ratio: f32) {
    if ratio == 1.0 {
        return;
    }
    let gain = 1.0 - (ratio - 1.0) * COMPENSATION_SLOPE;
    for sample in block.iter_mut() {
        *sample *= gain;
    }
}

pub struct FormantShifter {
    stretcher: Option<Box<dyn PitchStretcher>>,
    wet: Vec<f32>,
    engaged: bool,
    formant_correction: bool,
}

impl FormantShifter {
    pub fn new(max_block: usize) -> Self {
        Self {
            stretcher: None,
            wet: vec![0.0; max_block.max(1)],
            engaged: false,
            formant_correction: true,
        }
    }

    /// Resize the retrieval scratch. Not real-time safe.
    pub fn prepare(&mut self, max_block: usize) {
        self.wet.resize(max_block.max(1), 0.0);
        self.reset();
    }

    /// Install or remove the external stretcher, returning the previous one.
    pub fn set_stretcher(
        &mut self,
        stretcher: Option<Box<dyn PitchStretcher>>,
    ) -> Option<Box<dyn PitchStretcher>> {
        self.engaged = false;
        std::mem::replace(&mut self.stretcher, stretcher)
    }

    pub fn has_stretcher(&self) -> bool {
        self.stretcher.is_some()
    }

    pub fn stretcher_latency(&self) -> usize {
        self.stretcher
            .as_ref()
            .map_or(0, |stretcher| stretcher.latency_samples())
    }

    pub fn set_formant_correction(&mut self, enabled: bool) {
        self.formant_correction = enabled;
    }

    pub fn formant_correction(&self) -> bool {
        self.formant_correction
    }

    /// Whether the stretcher has been fed since the last gap.
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Mark a gap in the stretcher's input; it restarts on the next call.
    pub fn disengage(&mut self) {
        self.engaged = false;
    }

    pub fn reset(&mut self) {
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.reset();
        }
        self.engaged = false;
    }

    /// Shift `block` by `ratio` in place.
    ///
    /// `speed` only applies to the granular fallback; the stretcher path
    /// replaces the block outright.
    pub fn process(
        &mut self,
        block: &mut [f32],
        ratio: f32,
        speed: f32,
        fallback: &mut GranularShifter,
    ) {
        if self.stretcher.is_none() {
            if self.formant_correction {
                compensate(block, ratio);
            }
            fallback.process(block, ratio, speed);
            return;
        }
        self.stream(block, ratio);
    }

    /// Feed `block` through the stretcher unshifted so its delay carries on
    /// across runs that need no correction.
    ///
    /// Returns `false`, leaving the block alone, when no stretcher is installed.
    pub fn pass_through(&mut self, block: &mut [f32]) -> bool {
        if self.stretcher.is_none() {
            return false;
        }
        self.stream(block, 1.0);
        true
    }

    fn stream(&mut self, block: &mut [f32], ratio: f32) {
        let Some(stretcher) = self.stretcher.as_mut() else {
            return;
        };

        if !self.engaged {
            stretcher.reset();
            self.engaged = true;
        }
        stretcher.set_pitch_scale(ratio);
        stretcher.set_formant_scale(1.0);

        let capacity = self.wet.len();
        for block in block.chunks_mut(capacity) {
            let n = block.len();
            let mut got = 0;
            for input in block.chunks(FEED_CHUNK) {
                stretcher.process(input);
                got += stretcher.retrieve(&mut self.wet[got..n]);
            }
            block[n - got..].copy_from_slice(&self.wet[..got]);
        }
    }
}

impl std::fmt::Debug for FormantShifter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormantShifter")
            .field("has_stretcher", &self.has_stretcher())
            .field("engaged", &self.engaged)
            .field("formant_correction", &self.formant_correction)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stretcher::SpectralStretcher;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_compensation_gain() {
        let mut block = vec![1.0; 4];
        compensate(&mut block, 1.5);
        assert_relative_eq!(block[0], 0.85);

        let mut block = vec![1.0; 4];
        compensate(&mut block, 0.5);
        assert_relative_eq!(block[3], 1.15);

        let mut block = vec![1.0; 4];
        compensate(&mut block, 1.0);
        assert_eq!(block, vec![1.0; 4]);
    }

    #[test]
    fn test_fallback_matches_compensated_granular() {
        let input = sine(220.0, 512);

        let mut shifter = FormantShifter::new(512);
        let mut granular = GranularShifter::new(512);
        let mut block = input.clone();
        shifter.process(&mut block, 1.2, 0.5, &mut granular);

        let mut reference = GranularShifter::new(512);
        let mut expected = input.clone();
        compensate(&mut expected, 1.2);
        reference.process(&mut expected, 1.2, 0.5);

        assert_eq!(block, expected);
    }

    #[test]
    fn test_fallback_without_correction_skips_compensation() {
        let input = sine(220.0, 512);
        let mut shifter = FormantShifter::new(512);
        shifter.set_formant_correction(false);

        let mut granular = GranularShifter::new(512);
        let mut block = input.clone();
        shifter.process(&mut block, 1.2, 0.5, &mut granular);

        let mut expected = input.clone();
        GranularShifter::new(512).process(&mut expected, 1.2, 0.5);
        assert_eq!(block, expected);
    }

    #[test]
    fn test_partial_output_fills_tail() {
        let mut shifter = FormantShifter::new(1024);
        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(1024))));
        let mut granular = GranularShifter::new(1024);

        let input = sine(220.0, 1024);
        let mut block = input.clone();
        shifter.process(&mut block, 1.1, 1.0, &mut granular);

        // One frame completes: 256 samples land at the end
        assert_eq!(&block[..768], &input[..768]);
        assert!(shifter.is_engaged());
    }

    #[test]
    fn test_stretcher_output_does_not_stall() {
        let mut shifter = FormantShifter::new(512);
        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(1024))));
        let mut granular = GranularShifter::new(512);

        let input = sine(220.0, 512);
        let mut last = input.clone();
        for _ in 0..8 {
            last = input.clone();
            shifter.process(&mut last, 1.1, 1.0, &mut granular);
        }
        // Steady state replaces the whole block
        assert_ne!(last[0], input[0]);
        assert!(last.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_reengagement_resets_stretcher() {
        let mut shifter = FormantShifter::new(1024);
        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(1024))));
        let mut granular = GranularShifter::new(1024);

        let input = sine(220.0, 1024);
        let mut first = input.clone();
        shifter.process(&mut first, 1.1, 1.0, &mut granular);

        shifter.disengage();
        let mut second = input.clone();
        shifter.process(&mut second, 1.1, 1.0, &mut granular);

        assert_eq!(first, second);
    }

    #[test]
    fn test_pass_through_keeps_stretcher_engaged() {
        let mut shifter = FormantShifter::new(1024);
        let input = sine(220.0, 1024);
        let mut block = input.clone();
        assert!(!shifter.pass_through(&mut block));
        assert_eq!(block, input);

        shifter.set_stretcher(Some(Box::new(SpectralStretcher::new(512))));
        let mut granular = GranularShifter::new(1024);
        shifter.process(&mut block, 1.1, 1.0, &mut granular);

        let mut held = input.clone();
        assert!(shifter.pass_through(&mut held));
        assert!(shifter.is_engaged());
        // Delayed output, not the dry input
        assert_ne!(held, input);
    }

    #[test]
    fn test_set_stretcher_returns_previous() {
        let mut shifter = FormantShifter::new(256);
        assert!(shifter
            .set_stretcher(Some(Box::new(SpectralStretcher::default())))
            .is_none());
        assert_eq!(shifter.stretcher_latency(), 1536);
        assert!(shifter.set_stretcher(None).is_some());
        assert!(!shifter.has_stretcher());
    }
}
