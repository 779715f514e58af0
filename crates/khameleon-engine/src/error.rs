//! Error types for the engine and session driver

use khameleon_cache::CacheError;
use khameleon_core::CoreError;
use khameleon_predict::PredictError;
use khameleon_wire::WireError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine and session driver
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration, control-channel or I/O failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Frame could not be decoded
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// Cache could not be built
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Predictor failure
    #[error("Predictor error: {0}")]
    Predict(#[from] PredictError),

    /// JSON encoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A channel the session writes to was closed
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl EngineError {
    /// Whether the error came from a transport the session depends on
    pub fn is_transport(&self) -> bool {
        match self {
            EngineError::Core(e) => e.is_transport(),
            EngineError::ChannelClosed(_) => true,
            _ => false,
        }
    }
}
