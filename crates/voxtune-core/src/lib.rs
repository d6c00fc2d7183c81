//! Real-time primitives shared by every voxtune crate.
//!
//! # Contents
//!
//! - [`AtomicFloat`]: cache-line aligned cell written by a control thread and
//!   read by the audio thread
//! - [`SmoothedValue`]: linear parameter ramps for zipper-free changes
//! - [`ParameterRange`]: normalized ↔ real conversion for control parameters
//! - [`CpuMeter`]: per-block processing load tracking
//! - [`Error`]: setup-time configuration errors
//!
//! Nothing here allocates after construction.

pub mod error;
pub use error::{validate_stream, Error, Result, MAX_BLOCK_SIZE};

mod cpu;
pub use cpu::{CpuMeter, CpuMetrics};

mod lockfree;
pub use lockfree::AtomicFloat;

pub mod parameter;
pub use parameter::{ParameterRange, ParameterScale};

pub mod smooth;
pub use smooth::SmoothedValue;

pub use std::sync::atomic::Ordering;
