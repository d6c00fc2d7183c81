//! Error types for voxtune-core.

use thiserror::Error;

/// Setup-time errors.
///
/// Real-time processing never returns these; they surface from `prepare`,
/// constructors and config validation only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample rate: {0}. Must be between 8000 and 384000 Hz")]
    InvalidSampleRate(f64),

    #[error("Invalid block size: {0}. Must be between 1 and {max}", max = MAX_BLOCK_SIZE)]
    InvalidBlockSize(usize),

    #[error("Invalid channel count: {0}")]
    InvalidChannelCount(usize),

    #[error("Invalid scale definition: {0}")]
    InvalidScale(String),

    #[error("Not prepared: call prepare() before processing")]
    NotPrepared,
}

/// Largest block size accepted by `prepare`.
pub const MAX_BLOCK_SIZE: usize = 16384;

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Validate a sample rate and block size pair.
pub fn validate_stream(sample_rate: f64, block_size: usize) -> Result<()> {
    if !sample_rate.is_finite() || !(8000.0..=384_000.0).contains(&sample_rate) {
        return Err(Error::InvalidSampleRate(sample_rate));
    }
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(Error::InvalidBlockSize(block_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_stream() {
        assert!(validate_stream(44100.0, 512).is_ok());
        assert_eq!(
            validate_stream(0.0, 512),
            Err(Error::InvalidSampleRate(0.0))
        );
        assert_eq!(
            validate_stream(48000.0, 0),
            Err(Error::InvalidBlockSize(0))
        );
        assert!(validate_stream(f64::NAN, 256).is_err());
        assert!(validate_stream(48000.0, MAX_BLOCK_SIZE + 1).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::InvalidBlockSize(0);
        assert!(err.to_string().contains("16384"));
        assert_eq!(
            Error::InvalidConfig("bad".into()).to_string(),
            "Invalid config: bad"
        );
    }
}
