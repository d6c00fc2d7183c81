//! Test helpers and fixtures for voxtune integration tests
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)
//! - `PITCH_TOLERANCE_CENTS` (5.0): Pitch comparisons

#![allow(dead_code)]

pub mod tolerances;

use std::time::{Duration, Instant};
use voxtune::prelude::*;

/// Sample rate with an exact 100-sample period at A4.
pub const TEST_SAMPLE_RATE: f64 = 44000.0;

/// Standard block size for deterministic testing
pub const TEST_BLOCK_SIZE: usize = 512;

/// Log to the test writer; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Mono engine prepared at the test sample rate and block size.
pub fn test_engine(mode: Mode) -> CorrectionEngine {
    CorrectionEngine::builder()
        .channels(1)
        .mode(mode)
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .build()
        .expect("Failed to create test engine")
}

/// Sine wave at `frequency`, amplitude 0.5.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.5) as f32
        })
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Signed distance from `reference` to `frequency` in cents.
pub fn cents(frequency: f32, reference: f32) -> f32 {
    1200.0 * (frequency / reference).log2()
}

/// Mean frequency of `samples` from rising zero crossings, interpolated
/// between samples. 0 when fewer than two crossings are found.
pub fn crossing_frequency(samples: &[f32], sample_rate: f64) -> f32 {
    let mut first = None;
    let mut last = 0.0f32;
    let mut count = 0usize;
    for (i, pair) in samples.windows(2).enumerate() {
        if pair[0] <= 0.0 && pair[1] > 0.0 {
            let t = i as f32 + pair[0] / (pair[0] - pair[1]);
            first.get_or_insert(t);
            last = t;
            count += 1;
        }
    }
    match first {
        Some(first) if count > 1 && last > first => {
            (count - 1) as f32 * sample_rate as f32 / (last - first)
        }
        _ => 0.0,
    }
}

/// Run `signal` through `engine` one block at a time, returning every report.
pub fn process_signal(
    engine: &mut CorrectionEngine,
    signal: &mut [f32],
    params: &ParameterSet,
) -> Vec<BlockReport> {
    signal
        .chunks_mut(TEST_BLOCK_SIZE)
        .map(|block| engine.process_block(&mut [block], params))
        .collect()
}

/// Poll `condition` every millisecond until it holds or `max_wait_ms` passes.
pub fn wait_for(mut condition: impl FnMut() -> bool, max_wait_ms: u64) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(max_wait_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}
