//! Recency-weighted pitch smoothing.

/// Number of hops remembered.
pub const HISTORY_LEN: usize = 10;

/// Fixed ring of the last [`HISTORY_LEN`] fused pitches, oldest first.
///
/// The smoothed pitch weights slot `i` by `(i + 1) / 10`, so the newest value
/// counts ten times as much as the oldest. Empty (zero) slots are skipped.
/// Tracking therefore lags genuine pitch jumps by a few hops in exchange for
/// stability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchHistory {
    slots: [f32; HISTORY_LEN],
}

impl PitchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pitch at the tail, dropping the oldest.
    pub fn push(&mut self, frequency: f32) {
        self.slots.copy_within(1.., 0);
        self.slots[HISTORY_LEN - 1] = frequency;
    }

    /// Weighted mean of the non-zero slots, 0.0 if none.
    pub fn smoothed(&self) -> f32 {
        let (sum, weight) = self
            .slots
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f > 0.0)
            .fold((0.0f32, 0.0f32), |(sum, weight), (i, &f)| {
                let w = (i + 1) as f32 / HISTORY_LEN as f32;
                (sum + w * f, weight + w)
            });

        if weight > 0.0 {
            sum / weight
        } else {
            0.0
        }
    }

    pub fn latest(&self) -> f32 {
        self.slots[HISTORY_LEN - 1]
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|&f| f <= 0.0)
    }

    pub fn clear(&mut self) {
        self.slots = [0.0; HISTORY_LEN];
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.slots
    }
}
