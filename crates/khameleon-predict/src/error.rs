//! Error types for prediction

use thiserror::Error;

/// Result type for prediction
pub type Result<T> = std::result::Result<T, PredictError>;

/// Errors raised by the predictors
#[derive(Error, Debug)]
pub enum PredictError {
    /// Innovation covariance could not be inverted
    #[error("Singular matrix at trace step {step}")]
    SingularMatrix { step: usize },

    /// Action index outside the alphabet
    #[error("Action {action} out of range for {nactions} actions")]
    ActionOutOfRange { action: usize, nactions: usize },

    /// Matrix or vector of the wrong shape
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            PredictError::ActionOutOfRange {
                action: 7,
                nactions: 5
            }
            .to_string(),
            "Action 7 out of range for 5 actions"
        );
        assert_eq!(
            PredictError::SingularMatrix { step: 3 }.to_string(),
            "Singular matrix at trace step 3"
        );
    }
}
