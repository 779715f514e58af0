//! Cache statistics

use serde::{Deserialize, Serialize};

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live keys
    pub entries: usize,
    /// Live fragments across all keys
    pub fragments: usize,
    /// Fragments written
    pub writes: u64,
    /// Lookups that found the key
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
    /// Fragments freed by eviction
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 1e-12);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
