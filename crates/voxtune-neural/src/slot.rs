//! Lock-free hand-off of the latest prediction.

use crate::model::PitchPrediction;
use arc_swap::{ArcSwap, Guard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Latest [`PitchPrediction`], written by the inference thread and read by
/// the audio thread.
///
/// Reads never block and never allocate. The sequence number lets a reader
/// tell a fresh prediction from one it has already consumed.
pub struct PredictionSlot {
    latest: ArcSwap<PitchPrediction>,
    sequence: AtomicU64,
}

impl PredictionSlot {
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(PitchPrediction::unvoiced()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, prediction: PitchPrediction) {
        self.latest.store(Arc::new(prediction));
        self.sequence.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub fn load(&self) -> Guard<Arc<PitchPrediction>> {
        self.latest.load()
    }

    /// Number of predictions published so far.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Drop back to unvoiced, e.g. after the input stream restarts.
    pub fn clear(&self) {
        self.publish(PitchPrediction::unvoiced());
    }
}

impl Default for PredictionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PredictionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionSlot")
            .field("latest", &**self.latest.load())
            .field("sequence", &self.sequence())
            .finish()
    }
}
