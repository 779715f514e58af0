//! Error types for cache construction

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised when building a cache
#[derive(Error, Debug)]
pub enum CacheError {
    /// Capacity must hold at least one entry
    #[error("Invalid cache capacity: {0}")]
    InvalidCapacity(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_capacity_display() {
        assert_eq!(
            CacheError::InvalidCapacity(0).to_string(),
            "Invalid cache capacity: 0"
        );
    }
}
