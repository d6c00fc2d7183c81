//! Multi-detector pitch estimator with hop scheduling and smoothing.

use super::{
    AutocorrelationDetector, Detection, FusionPolicy, HarmonicProductDetector, PitchAlgorithm,
    PitchEstimate, PitchHistory, SpectralPeakDetector, YinDetector, HISTORY_LEN,
};
use crate::spectrum::{FormantSet, SpectralAnalyzer, FRAME_SIZES, ZERO_PAD};
use crate::window::{floor_power_of_two, AnalysisWindow, MAX_WINDOW};

/// Smallest analysis window the estimator will use.
pub const MIN_ANALYSIS_WINDOW: usize = 1024;

/// Per-detector weights for combined fusion.
///
/// The defaults are empirical, not derived; treat them as tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FusionWeights {
    pub autocorrelation: f32,
    pub yin: f32,
    pub spectral: f32,
    pub harmonic: f32,
}

impl FusionWeights {
    /// Weights in [`PitchAlgorithm`] order.
    pub fn as_array(&self) -> [f32; 4] {
        [self.autocorrelation, self.yin, self.spectral, self.harmonic]
    }

    pub fn weight(&self, algorithm: PitchAlgorithm) -> f32 {
        self.as_array()[algorithm.index()]
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            autocorrelation: 0.2,
            yin: 0.3,
            spectral: 0.3,
            harmonic: 0.2,
        }
    }
}

/// Estimator settings derived from the active correction mode.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct EstimatorConfig {
    /// Requested analysis window; rounded down to a power of two in 1024..=4096.
    pub window_size: usize,
    pub policy: FusionPolicy,
    /// Run the spectral-peak and harmonic-product detectors in combined fusion.
    pub harmonic_analysis: bool,
    /// Peak-pick formants every hop.
    pub formant_tracking: bool,
    pub weights: FusionWeights,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            policy: FusionPolicy::Basic,
            harmonic_analysis: false,
            formant_tracking: false,
            weights: FusionWeights::default(),
        }
    }
}

/// Weighted average of the valid detections.
///
/// `None` when no detector with a positive weight found a pitch. With a
/// single valid detector the result is that detector's output.
pub fn fuse(detections: &[Detection; 4], weights: &FusionWeights) -> Option<Detection> {
    let mut frequency = 0.0f32;
    let mut confidence = 0.0f32;
    let mut total = 0.0f32;

    for (detection, &weight) in detections.iter().zip(&weights.as_array()) {
        if detection.is_valid() && weight > 0.0 {
            frequency += weight * detection.frequency;
            confidence += weight * detection.confidence;
            total += weight;
        }
    }

    (total > 0.0).then(|| Detection {
        frequency: frequency / total,
        confidence: confidence / total,
    })
}

struct Detectors {
    autocorrelation: AutocorrelationDetector,
    yin: YinDetector,
    analyzer: SpectralAnalyzer,
    spectral: SpectralPeakDetector,
    harmonic: HarmonicProductDetector,
}

impl Detectors {
    fn new(sample_rate: f64, frame_size: usize) -> Self {
        let max_bins = FRAME_SIZES[FRAME_SIZES.len() - 1] * ZERO_PAD / 2 + 1;
        Self {
            autocorrelation: AutocorrelationDetector::with_max_window(MAX_WINDOW),
            yin: YinDetector::with_max_window(MAX_WINDOW),
            analyzer: SpectralAnalyzer::new(sample_rate, frame_size),
            spectral: SpectralPeakDetector::new(),
            harmonic: HarmonicProductDetector::new(max_bins),
        }
    }

    fn run(&mut self, config: &EstimatorConfig, window: &AnalysisWindow<'_>) -> [Detection; 4] {
        let mut out = [Detection::NONE; 4];
        let combined = config.policy == FusionPolicy::Combined;
        let spectral = combined && config.harmonic_analysis;

        out[PitchAlgorithm::Autocorrelation.index()] = self.autocorrelation.detect(window);
        if combined {
            out[PitchAlgorithm::Yin.index()] = self.yin.detect(window);
        }

        if (spectral || config.formant_tracking) && self.analyzer.analyze(window.samples()) {
            if spectral {
                out[PitchAlgorithm::SpectralPeak.index()] = self.spectral.detect(&self.analyzer);
                out[PitchAlgorithm::HarmonicProduct.index()] =
                    self.harmonic.detect(&self.analyzer);
            }
            if config.formant_tracking {
                self.analyzer.detect_formants();
            }
        }

        out
    }
}

/// Streaming pitch estimator.
///
/// Feed audio with [`process`](Self::process); the estimate is recomputed
/// every hop (256 samples for [`FusionPolicy::Basic`], 128 for
/// [`FusionPolicy::Combined`]) over the most recent window and held in
/// between. All buffers are sized at construction; nothing allocates
/// afterwards, including [`set_config`](Self::set_config).
///
/// Nothing is analyzed until a full window of input has arrived; the
/// estimate stays unvoiced until then.
///
/// A hop where every detector fails keeps the previous estimate. Only after
/// [`HISTORY_LEN`] consecutive failed hops does the estimate drop to unvoiced.
pub struct PitchEstimator {
    sample_rate: f64,
    config: EstimatorConfig,
    window_size: usize,

    // Input history
    ring: Vec<f32>,
    write_pos: usize,
    filled: usize,
    frame: Vec<f32>,
    hop_counter: usize,

    detectors: Detectors,
    detections: [Detection; 4],
    history: PitchHistory,
    current: PitchEstimate,
    dropout_hops: usize,
}

impl PitchEstimator {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(sample_rate, EstimatorConfig::default())
    }

    pub fn with_config(sample_rate: f64, config: EstimatorConfig) -> Self {
        let window_size = effective_window(config.window_size);
        Self {
            sample_rate,
            config,
            window_size,
            ring: vec![0.0; MAX_WINDOW],
            write_pos: 0,
            filled: 0,
            frame: vec![0.0; MAX_WINDOW],
            hop_counter: 0,
            detectors: Detectors::new(sample_rate, window_size),
            detections: [Detection::NONE; 4],
            history: PitchHistory::new(),
            current: PitchEstimate::UNVOICED,
            dropout_hops: 0,
        }
    }

    /// Apply new settings. Keeps input and pitch history.
    pub fn set_config(&mut self, config: EstimatorConfig) {
        self.window_size = effective_window(config.window_size);
        self.detectors.analyzer.set_frame_size(self.window_size);
        self.config = config;
        self.hop_counter = self.hop_counter.min(self.hop_size() - 1);
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change sample rate and clear all history.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.detectors.analyzer.set_sample_rate(sample_rate);
        self.reset();
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.config.policy.hop_size()
    }

    /// Analysis window actually used once enough input has arrived.
    #[inline]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Run the enabled detectors over `window`, fuse, smooth and store the result.
    pub fn estimate(&mut self, window: &AnalysisWindow<'_>) -> PitchEstimate {
        let detections = self.detectors.run(&self.config, window);
        self.update(detections, window.rms())
    }

    /// Last computed estimate, without recomputation.
    #[inline]
    pub fn quick_estimate(&self) -> PitchEstimate {
        self.current
    }

    /// Consume `input`, writing the held pitch (Hz, 0 = unvoiced) per sample to `pitch_out`.
    ///
    /// Processes `min(input.len(), pitch_out.len())` samples.
    pub fn process(&mut self, input: &[f32], pitch_out: &mut [f32]) {
        let capacity = self.ring.len();
        for (&sample, out) in input.iter().zip(pitch_out.iter_mut()) {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
            self.filled = (self.filled + 1).min(capacity);

            self.hop_counter += 1;
            if self.hop_counter >= self.hop_size() {
                self.hop_counter = 0;
                self.analyze_history();
            }

            *out = self.current.frequency_hz;
        }
    }

    /// Raw detector outputs from the last hop, in [`PitchAlgorithm`] order.
    pub fn detections(&self) -> &[Detection; 4] {
        &self.detections
    }

    pub fn detection(&self, algorithm: PitchAlgorithm) -> Detection {
        self.detections[algorithm.index()]
    }

    /// Formants from the last hop (empty unless formant tracking is on).
    pub fn formants(&self) -> &FormantSet {
        self.detectors.analyzer.formants()
    }

    pub fn spectral_analyzer(&self) -> &SpectralAnalyzer {
        &self.detectors.analyzer
    }

    pub fn history(&self) -> &PitchHistory {
        &self.history
    }

    /// Clear input, pitch history and the held estimate. Does not resize.
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.hop_counter = 0;
        self.detections = [Detection::NONE; 4];
        self.history.clear();
        self.current = PitchEstimate::UNVOICED;
        self.dropout_hops = 0;
        self.detectors.analyzer.reset();
    }

    fn analyze_history(&mut self) {
        // Short windows bias the pitch low and the bias lingers in the history
        if self.filled < self.window_size {
            return;
        }
        let len = self.window_size;
        let capacity = self.ring.len();
        let start = (self.write_pos + capacity - len) % capacity;

        let first = len.min(capacity - start);
        self.frame[..first].copy_from_slice(&self.ring[start..start + first]);
        self.frame[first..len].copy_from_slice(&self.ring[..len - first]);

        let window = AnalysisWindow::new(&self.frame[..len], self.sample_rate);
        let detections = self.detectors.run(&self.config, &window);
        let rms = window.rms();
        self.update(detections, rms);
    }

    fn update(&mut self, detections: [Detection; 4], rms: f32) -> PitchEstimate {
        self.detections = detections;

        match fuse(&detections, &self.config.weights) {
            Some(fused) => {
                self.dropout_hops = 0;
                self.history.push(fused.frequency);
                self.current = PitchEstimate {
                    frequency_hz: self.history.smoothed(),
                    confidence: fused.confidence,
                    rms,
                };
            }
            None => {
                self.dropout_hops += 1;
                if self.dropout_hops >= HISTORY_LEN {
                    self.history.clear();
                    self.current = PitchEstimate {
                        rms,
                        ..PitchEstimate::UNVOICED
                    };
                } else {
                    self.current.rms = rms;
                }
            }
        }

        self.current
    }
}

fn effective_window(requested: usize) -> usize {
    floor_power_of_two(requested.clamp(MIN_ANALYSIS_WINDOW, MAX_WINDOW))
}
