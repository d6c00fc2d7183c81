//! Background inference thread.
//!
//! The audio thread pushes samples into a SPSC ring buffer through an
//! [`AiLink`] and reads the latest prediction from a [`PredictionSlot`]. The
//! inference thread drains the ring into a sliding window and runs the
//! predictor every hop. Neither side ever waits on the other.

use crate::error::{AiError, Result};
use crate::model::{PitchPredictor, PitchPrediction};
use crate::slot::PredictionSlot;
use arc_swap::Guard;
use crossbeam_channel::{Receiver, Sender};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Samples handed to the predictor per call.
    pub window_size: usize,
    /// New samples between predictions.
    pub hop_size: usize,
    /// Ring buffer capacity; input beyond it is dropped.
    pub queue_capacity: usize,
    /// Sleep when the ring is empty.
    pub idle_sleep: Duration,
    /// Undelivered errors kept for the control thread.
    pub error_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 512,
            queue_capacity: 16384,
            idle_sleep: Duration::from_millis(5),
            error_capacity: 16,
        }
    }
}

/// Audio-thread end of an inference worker.
pub struct AiLink {
    producer: HeapProd<f32>,
    slot: Arc<PredictionSlot>,
    dropped: u64,
}

impl AiLink {
    /// Queue samples for analysis. Never blocks; returns how many were queued.
    #[inline]
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let pushed = self.producer.push_slice(samples);
        self.dropped += (samples.len() - pushed) as u64;
        pushed
    }

    /// Latest published prediction.
    #[inline]
    pub fn latest(&self) -> Guard<Arc<PitchPrediction>> {
        self.slot.load()
    }

    pub fn slot(&self) -> &Arc<PredictionSlot> {
        &self.slot
    }

    /// Samples discarded because the queue was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }
}

impl std::fmt::Debug for AiLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiLink")
            .field("slot", &self.slot)
            .field("dropped", &self.dropped)
            .finish()
    }
}

/// Owner of the inference thread. Stops and joins it on drop.
pub struct InferenceWorker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    errors: Receiver<AiError>,
    slot: Arc<PredictionSlot>,
}

impl InferenceWorker {
    /// Start a thread running `predictor` on audio queued through the returned link.
    pub fn spawn(
        predictor: Box<dyn PitchPredictor>,
        sample_rate: f32,
        config: WorkerConfig,
    ) -> Result<(Self, AiLink)> {
        if !predictor.is_loaded() {
            return Err(AiError::model_load_failed(format!(
                "model '{}' is not loaded",
                predictor.info().name
            )));
        }
        if config.window_size == 0 || config.hop_size == 0 || config.queue_capacity == 0 {
            return Err(AiError::incompatible_model(
                "window, hop and queue sizes must be non-zero",
            ));
        }

        let (producer, consumer) = HeapRb::<f32>::new(config.queue_capacity).split();
        let (error_tx, error_rx) = crossbeam_channel::bounded(config.error_capacity.max(1));
        let slot = Arc::new(PredictionSlot::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let slot = slot.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("voxtune-inference".to_string())
                .spawn(move || {
                    run_inference_thread(
                        predictor,
                        consumer,
                        slot,
                        running,
                        error_tx,
                        sample_rate,
                        config,
                    )
                })
                .map_err(|e| AiError::processing(format!("failed to spawn thread: {}", e)))?
        };

        let worker = Self {
            running,
            handle: Some(handle),
            errors: error_rx,
            slot: slot.clone(),
        };
        let link = AiLink {
            producer,
            slot,
            dropped: 0,
        };
        Ok((worker, link))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn slot(&self) -> &Arc<PredictionSlot> {
        &self.slot
    }

    /// Prediction failures, oldest first. Full channels drop new errors.
    pub fn errors(&self) -> &Receiver<AiError> {
        &self.errors
    }

    /// Signal the thread to stop and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Inference thread panicked");
            }
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain `consumer` into a sliding window and publish a prediction every hop.
///
/// Blocks until `running` is cleared.
fn run_inference_thread(
    mut predictor: Box<dyn PitchPredictor>,
    mut consumer: HeapCons<f32>,
    slot: Arc<PredictionSlot>,
    running: Arc<AtomicBool>,
    errors: Sender<AiError>,
    sample_rate: f32,
    config: WorkerConfig,
) {
    tracing::info!(
        "Inference thread starting for model: {}",
        predictor.info().name
    );

    let window_size = config.window_size;
    let mut window = vec![0.0f32; window_size];
    let mut frame = vec![0.0f32; window_size];
    let mut window_pos = 0usize;
    let mut filled = 0usize;
    let mut hop_counter = 0usize;
    let mut drain_buf = [0.0f32; 1024];

    while running.load(Ordering::Acquire) {
        if consumer.occupied_len() == 0 {
            std::thread::sleep(config.idle_sleep);
            continue;
        }

        let read = consumer.pop_slice(&mut drain_buf);
        for &sample in &drain_buf[..read] {
            window[window_pos] = sample;
            window_pos = (window_pos + 1) % window_size;
            filled = (filled + 1).min(window_size);
            hop_counter += 1;

            if hop_counter < config.hop_size || filled < window_size {
                continue;
            }
            hop_counter = 0;

            // Oldest sample sits at window_pos
            let tail = window_size - window_pos;
            frame[..tail].copy_from_slice(&window[window_pos..]);
            frame[tail..].copy_from_slice(&window[..window_pos]);

            match predictor.predict(&frame, sample_rate) {
                Ok(prediction) => slot.publish(prediction),
                Err(e) => {
                    tracing::warn!("Pitch prediction failed: {}", e);
                    if errors.try_send(e).is_err() {
                        tracing::trace!("Inference error queue full, dropping error");
                    }
                }
            }
        }
    }

    tracing::info!("Inference thread shutting down");
}
