//! Granular pitch shifting for smooth ("classic") correction.
//!
//! ## Algorithm Overview
//!
//! 1. **Grain extraction**: grains of `min(512, n)` samples start every
//!    `grain · speed` samples (clamped to `[grain/8, grain]`)
//! 2. **Resampling**: each grain reads the dry block at `i / ratio` with linear
//!    interpolation, so its contents are transposed by `ratio`
//! 3. **Windowing**: symmetric Hann window from a precomputed table
//! 4. **Blend**: `blend · grain + (1 - blend) · buffer` written back in place
//!
//! ## RT-Safety
//!
//! The dry copy and grain storage are allocated by [`GranularShifter::prepare`].
//! `process()` performs no allocations; blocks longer than the prepared size
//! are processed in chunks.

use std::f32::consts::PI;

/// Largest grain in samples.
pub const MAX_GRAIN: usize = 512;

/// Default wet share of the blend. Tunable, not derived from anything physical.
pub const DEFAULT_BLEND: f32 = 0.7;

/// One resampled grain.
///
/// Storage is allocated once at [`MAX_GRAIN`] and refilled per grain.
#[derive(Debug, Clone)]
pub struct Grain {
    samples: Vec<f32>,
    len: usize,
    /// Start of the grain in the current block.
    pub source_position: usize,
    pub pitch_ratio: f32,
}

impl Grain {
    fn new() -> Self {
        Self {
            samples: vec![0.0; MAX_GRAIN],
            len: 0,
            source_position: 0,
            pitch_ratio: 1.0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.len]
    }

    /// Resample `source` at `i / ratio` into the grain and apply the window.
    ///
    /// Reads past the end of `source` contribute silence.
    fn fill(&mut self, source: &[f32], position: usize, ratio: f32, window: &HannTable) {
        let len = source.len().min(MAX_GRAIN);
        self.len = len;
        self.source_position = position;
        self.pitch_ratio = ratio;

        for i in 0..len {
            let source_index = i as f32 / ratio;
            let index1 = source_index as usize;
            let fraction = source_index - index1 as f32;

            let sample = if index1 + 1 < len {
                source[index1] * (1.0 - fraction) + source[index1 + 1] * fraction
            } else if index1 < len {
                source[index1]
            } else {
                0.0
            };
            self.samples[i] = sample * window.at(i, len);
        }
    }
}

/// Symmetric Hann window sampled at [`MAX_GRAIN`] points.
///
/// Shorter windows are read by linear interpolation over the same curve.
#[derive(Debug, Clone)]
struct HannTable {
    table: Vec<f32>,
}

impl HannTable {
    fn new() -> Self {
        let denom = (MAX_GRAIN - 1) as f32;
        Self {
            table: (0..MAX_GRAIN)
                .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos()))
                .collect(),
        }
    }

    #[inline]
    fn at(&self, i: usize, len: usize) -> f32 {
        if len < 2 {
            return 1.0;
        }
        if len == MAX_GRAIN {
            return self.table[i];
        }
        let position = i as f32 * (MAX_GRAIN - 1) as f32 / (len - 1) as f32;
        let index = position as usize;
        if index + 1 >= MAX_GRAIN {
            return self.table[MAX_GRAIN - 1];
        }
        let fraction = position - index as f32;
        self.table[index] * (1.0 - fraction) + self.table[index + 1] * fraction
    }
}

/// Overlap-add granular shifter.
#[derive(Debug, Clone)]
pub struct GranularShifter {
    dry: Vec<f32>,
    grain: Grain,
    window: HannTable,
    blend: f32,
}

impl GranularShifter {
    /// Create a shifter for blocks of up to `max_block` samples.
    pub fn new(max_block: usize) -> Self {
        Self {
            dry: vec![0.0; max_block.max(1)],
            grain: Grain::new(),
            window: HannTable::new(),
            blend: DEFAULT_BLEND,
        }
    }

    /// Resize the dry scratch. Not real-time safe.
    pub fn prepare(&mut self, max_block: usize) {
        self.dry.resize(max_block.max(1), 0.0);
    }

    pub fn max_block(&self) -> usize {
        self.dry.len()
    }

    /// Set the wet share of the output (0.0 - 1.0).
    pub fn set_blend(&mut self, blend: f32) {
        self.blend = blend.clamp(0.0, 1.0);
    }

    pub fn blend(&self) -> f32 {
        self.blend
    }

    /// The most recently written grain.
    pub fn last_grain(&self) -> &Grain {
        &self.grain
    }

    /// Shift `block` by `ratio` in place.
    ///
    /// `speed` (0.0 - 1.0) sets the grain hop as a fraction of the grain
    /// length; lower values overlap grains more densely.
    pub fn process(&mut self, block: &mut [f32], ratio: f32, speed: f32) {
        if !ratio.is_finite() || ratio <= 0.0 {
            return;
        }
        let capacity = self.dry.len();
        for chunk in block.chunks_mut(capacity) {
            self.process_chunk(chunk, ratio, speed);
        }
    }

    fn process_chunk(&mut self, block: &mut [f32], ratio: f32, speed: f32) {
        let n = block.len();
        if n == 0 {
            return;
        }
        let grain_len = MAX_GRAIN.min(n);
        let hop = ((grain_len as f32 * speed.max(0.0)) as usize)
            .clamp((grain_len / 8).max(1), grain_len);

        self.dry[..n].copy_from_slice(block);

        let wet = self.blend;
        let dry = 1.0 - wet;
        let mut pos = 0;
        while pos < n {
            let end = (pos + grain_len).min(n);
            self.grain
                .fill(&self.dry[pos..end], pos, ratio, &self.window);

            for (out, &g) in block[pos..end].iter_mut().zip(self.grain.samples()) {
                *out = g * wet + *out * dry;
            }
            pos += hop;
        }
    }
}

impl Default for GranularShifter {
    fn default() -> Self {
        Self::new(MAX_GRAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / 44100.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_hann_table_shape() {
        let window = HannTable::new();
        assert_eq!(window.at(0, MAX_GRAIN), 0.0);
        assert_relative_eq!(window.at(MAX_GRAIN - 1, MAX_GRAIN), 0.0, epsilon = 1e-6);
        // Interpolated short window keeps symmetric endpoints
        assert!(window.at(0, 100) < 1e-6);
        assert!(window.at(99, 100) < 1e-3);
        assert!(window.at(50, 101) > 0.99);
    }

    #[test]
    fn test_unit_ratio_blends_windowed_copy() {
        let mut shifter = GranularShifter::new(512);
        let input = sine(220.0, 512);
        let mut block = input.clone();
        // Single grain: hop clamps to the grain length
        shifter.process(&mut block, 1.0, 1.0);

        let window = HannTable::new();
        for i in 0..512 {
            let expected = input[i] * window.at(i, 512) * 0.7 + input[i] * 0.3;
            assert_relative_eq!(block[i], expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut shifter = GranularShifter::new(1024);
        let mut block = vec![0.0; 1024];
        shifter.process(&mut block, 1.5, 0.5);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_grain_records_ratio_and_position() {
        let mut shifter = GranularShifter::new(1024);
        let mut block = sine(300.0, 1024);
        shifter.process(&mut block, 1.25, 1.0);

        let grain = shifter.last_grain();
        assert_eq!(grain.pitch_ratio, 1.25);
        assert_eq!(grain.source_position, 512);
        assert_eq!(grain.samples().len(), 512);
    }

    #[test]
    fn test_hop_clamped_to_eighth_grain() {
        let mut shifter = GranularShifter::new(512);
        let mut block = sine(300.0, 512);
        shifter.process(&mut block, 0.9, 0.0);
        // Last grain starts at 7 · 64 and is truncated to the block
        assert_eq!(shifter.last_grain().source_position, 448);
        assert_eq!(shifter.last_grain().samples().len(), 64);
    }

    #[test]
    fn test_oversized_block_is_chunked() {
        let mut shifter = GranularShifter::new(256);
        let mut block = sine(440.0, 1000);
        shifter.process(&mut block, 1.1, 1.0);
        assert!(block.iter().all(|s| s.is_finite()));
        assert_eq!(shifter.max_block(), 256);
    }

    #[test]
    fn test_invalid_ratio_is_ignored() {
        let mut shifter = GranularShifter::new(512);
        let input = sine(220.0, 512);
        let mut block = input.clone();
        shifter.process(&mut block, 0.0, 1.0);
        shifter.process(&mut block, f32::NAN, 1.0);
        assert_eq!(block, input);
    }

    #[test]
    fn test_blend_clamped() {
        let mut shifter = GranularShifter::default();
        shifter.set_blend(1.5);
        assert_eq!(shifter.blend(), 1.0);
    }
}
