//! Centralized error type for the voxtune umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] voxtune_core::Error),

    #[error("Model: {0}")]
    Ai(#[from] voxtune_neural::AiError),

    #[error("Mode: {0}")]
    Mode(#[from] crate::mode::ModeError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::ModeError;
    use voxtune_neural::AiError;

    #[test]
    fn test_conversions() {
        let core: Error = voxtune_core::Error::InvalidChannelCount(0).into();
        assert_eq!(core.to_string(), "Invalid channel count: 0");

        let ai: Error = AiError::model_not_found("crepe-tiny").into();
        assert!(ai.to_string().starts_with("Model: "));

        let mode: Error = ModeError::InvalidMode(5).into();
        assert_eq!(mode.to_string(), "Mode: Invalid mode index: 5");
    }
}
