//! Error types shared across the session layer

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by configuration, control channel and telemetry plumbing
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A control-channel post failed
    #[error("Control channel error on {endpoint}: {message}")]
    Control {
        endpoint: &'static str,
        message: String,
    },

    /// The session was used after it was deactivated
    #[error("Session inactive")]
    Inactive,

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a control-channel error
    pub fn control(endpoint: &'static str, message: impl Into<String>) -> Self {
        CoreError::Control {
            endpoint,
            message: message.into(),
        }
    }

    /// Whether the failure came from the transport side
    pub fn is_transport(&self) -> bool {
        matches!(self, CoreError::Control { .. } | CoreError::Io(_))
    }

    /// Get error category for telemetry
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config",
            CoreError::Control { .. } => "control",
            CoreError::Inactive => "inactive",
            CoreError::Json(_) => "json",
            CoreError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_display() {
        let err = CoreError::control("/post_dist", "connection reset");
        assert_eq!(
            err.to_string(),
            "Control channel error on /post_dist: connection reset"
        );
        assert!(err.is_transport());
        assert_eq!(err.category(), "control");
    }

    #[test]
    fn test_config_error_not_transport() {
        let err = CoreError::Config("cache_size must be positive".into());
        assert!(!err.is_transport());
        assert_eq!(err.category(), "config");
    }
}
