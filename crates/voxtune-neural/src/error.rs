//! Error types for AI pitch prediction and synthesis.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

/// Discrete failure classes reported by AI collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiErrorCode {
    ModelNotFound,
    ModelLoadFailed,
    IncompatibleModel,
    ProcessingError,
    OutOfMemory,
}

impl AiErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelNotFound => "model not found",
            Self::ModelLoadFailed => "model load failed",
            Self::IncompatibleModel => "incompatible model",
            Self::ProcessingError => "processing error",
            Self::OutOfMemory => "out of memory",
        }
    }
}

impl std::fmt::Display for AiErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct AiError {
    code: AiErrorCode,
    message: String,
}

impl AiError {
    pub fn new(code: AiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::new(AiErrorCode::ModelNotFound, message)
    }

    pub fn model_load_failed(message: impl Into<String>) -> Self {
        Self::new(AiErrorCode::ModelLoadFailed, message)
    }

    pub fn incompatible_model(message: impl Into<String>) -> Self {
        Self::new(AiErrorCode::IncompatibleModel, message)
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(AiErrorCode::ProcessingError, message)
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(AiErrorCode::OutOfMemory, message)
    }

    pub fn code(&self) -> AiErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
