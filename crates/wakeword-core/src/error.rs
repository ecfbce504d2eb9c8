//! Error taxonomy shared by the extractor, model runtime and detector

use thiserror::Error;

/// Errors that can occur anywhere in the wake-word pipeline
#[derive(Error, Debug)]
pub enum WakeWordError {
    /// Empty or out-of-range input, detected before any work begins
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure during initialization
    #[error("Out of memory: {0}")]
    NoMemory(String),

    /// Audio arrived before a model was loaded; keep capturing
    #[error("Detector not ready: no model loaded")]
    NotReady,

    #[error("Feature extraction failed: {0}")]
    PreprocessingFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// The runtime lacks the capability backing the requested operation
    #[error("Operation not supported by this build")]
    NotSupported,

    /// The model runtime was never successfully initialized
    #[error("Model runtime not initialized")]
    InvalidState,

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid model size: {size} bytes (max {max})")]
    InvalidModelSize { size: u64, max: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be encoded as JSON
    #[error("Config serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WakeWordError {
    /// Whether the detector stays usable after this error was returned for a frame
    ///
    /// Per-frame failures are counted and reported but never tear the
    /// detector down; only initialization errors are fatal to an instance.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotReady
                | Self::NotSupported
                | Self::PreprocessingFailed(_)
                | Self::InferenceFailed(_)
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, WakeWordError>;
