//! Error types for pixa-ai
//!
//! Backend failures are soft inside the orchestrator (logged, next backend
//! tried). Download and storage failures always surface to the caller.

use thiserror::Error;

/// Inference and model lifecycle error
#[derive(Debug, Error)]
pub enum InferenceError {
    /// No usable backend (or this backend is not usable right now)
    #[error("No inference engine is available")]
    NotAvailable,

    /// Local model files are missing or incomplete
    #[error("Model is not loaded")]
    ModelNotLoaded,

    /// Backend ran but failed to produce a result
    #[error("Tag extraction failed: {0}")]
    ExtractionFailed(String),

    /// Backend answered with something that could not be interpreted
    #[error("Invalid response from inference engine")]
    InvalidResponse,

    /// Model download failed
    #[error("Model download failed: {0}")]
    DownloadFailed(String),

    /// Not enough free space on the model volume
    #[error("Insufficient storage for model download")]
    InsufficientStorage,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// pixa-common error
    #[error("Common error: {0}")]
    Common(#[from] pixa_common::Error),
}

impl InferenceError {
    /// True for errors that only mean "this backend cannot run now"
    pub fn is_availability(&self) -> bool {
        matches!(self, InferenceError::NotAvailable | InferenceError::ModelNotLoaded)
    }
}

/// Result type for pixa-ai operations
pub type InferenceResult<T> = Result<T, InferenceError>;
