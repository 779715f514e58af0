//! Error types for frame decoding

use thiserror::Error;

/// Result type for wire operations
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors raised while decoding frames and acknowledgements
#[derive(Error, Debug)]
pub enum WireError {
    /// A declared length runs past the end of the buffer
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: usize },

    /// Acknowledgement text could not be parsed
    #[error("Malformed acknowledgement: {0:?}")]
    MalformedAck(String),

    /// IO error while reading a frame log
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Create a truncation error
    pub fn truncated(needed: u64, available: usize) -> Self {
        WireError::Truncated { needed, available }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = WireError::truncated(64, 20);
        assert_eq!(err.to_string(), "Truncated frame: need 64 bytes, have 20");
    }

    #[test]
    fn test_malformed_ack_display() {
        let err = WireError::MalformedAck("7".into());
        assert_eq!(err.to_string(), "Malformed acknowledgement: \"7\"");
    }
}
