//! Lock-free cells for control-thread → audio-thread parameter hand-off.

use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;

/// Cache-line aligned atomic f32.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn get_relaxed(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }

    /// Store `value` clamped into `[min, max]`.
    #[inline]
    pub fn set_clamped(&self, value: f32, min: f32, max: f32) {
        self.set(value.clamp(min, max));
    }

    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_atomic_float() {
        let val = AtomicFloat::new(1.0);
        assert_eq!(val.get(), 1.0);
        val.set(2.5);
        assert_eq!(val.get(), 2.5);
        assert_eq!(val.swap(3.0), 2.5);
        assert_eq!(val.get_relaxed(), 3.0);
    }

    #[test]
    fn test_set_clamped() {
        let val = AtomicFloat::new(50.0);
        val.set_clamped(150.0, 0.0, 100.0);
        assert_eq!(val.get(), 100.0);
        val.set_clamped(-3.0, 0.0, 100.0);
        assert_eq!(val.get(), 0.0);
    }

    #[test]
    fn test_cross_thread_visibility() {
        let val = Arc::new(AtomicFloat::new(0.0));
        let writer = Arc::clone(&val);
        std::thread::spawn(move || writer.set(42.0))
            .join()
            .unwrap();
        assert_eq!(val.get(), 42.0);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(std::mem::align_of::<AtomicFloat>(), 64);
    }
}
