//! Session configuration

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cache eviction policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Whole-entry least-recently-used store, bounded by key count
    Lru,
    /// Reference-counted FIFO ring bounded by fragment slots
    #[serde(alias = "ringIndex")]
    RingIndex,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Eviction policy
    #[serde(default = "default_cache_policy")]
    pub policy: CachePolicy,
    /// Capacity: keys for LRU, fragment slots for the ring
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// LRU only: a write replaces the key's fragment set instead of merging
    #[serde(default)]
    pub replace_on_write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: default_cache_policy(),
            cache_size: default_cache_size(),
            replace_on_write: false,
        }
    }
}

impl CacheConfig {
    /// Ring policy with the given slot count
    pub fn ring(cache_size: usize) -> Self {
        Self {
            policy: CachePolicy::RingIndex,
            cache_size,
            replace_on_write: false,
        }
    }

    /// LRU policy with the given key count
    pub fn lru(cache_size: usize) -> Self {
        Self {
            policy: CachePolicy::Lru,
            cache_size,
            replace_on_write: false,
        }
    }

    /// Set replace-on-write
    pub fn with_replace_on_write(mut self, replace: bool) -> Self {
        self.replace_on_write = replace;
        self
    }
}

/// Distribution model a predictor emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistModel {
    /// Gaussian per future offset
    #[serde(rename = "GM")]
    Gaussian,
    /// Dictionary / transition matrix
    #[serde(rename = "DM")]
    Dictionary,
    /// Gaussian per offset plus point-confidence
    #[serde(rename = "LGP")]
    LinearGaussianPoint,
}

impl DistModel {
    /// Wire tag
    pub fn tag(&self) -> &'static str {
        match self {
            DistModel::Gaussian => "GM",
            DistModel::Dictionary => "DM",
            DistModel::LinearGaussianPoint => "LGP",
        }
    }
}

/// Pointer trace sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Minimum spacing between samples (ms)
    #[serde(default = "default_min_resolution")]
    pub min_resolution_ms: u64,
    /// Samples retained (FIFO)
    #[serde(default = "default_trace_length")]
    pub trace_length: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            min_resolution_ms: default_min_resolution(),
            trace_length: default_trace_length(),
        }
    }
}

/// Predictor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Emitted distribution model
    #[serde(default = "default_model")]
    pub model: DistModel,
    /// Future offsets to project to (ms)
    #[serde(default = "default_time_range")]
    pub time_range: Vec<u64>,
    /// Tick interval (ms)
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,
    /// Stationary time below which the point model is fully confident (ms)
    #[serde(default = "default_thresh_stop")]
    pub thresh_stop: f64,
    /// Stationary time at which confidence reaches the floor (ms)
    #[serde(default = "default_max_stop")]
    pub max_stop: f64,
    /// Lowest point-model confidence
    #[serde(default = "default_alpha_floor")]
    pub alpha_floor: f64,
    /// Scale applied to projected variance
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Per-millisecond covariance inflation
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// Diagonal process noise
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    /// Diagonal measurement noise (x, y, vx, vy, ax, ay)
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: [f64; 6],
    /// Velocity contribution to projected position
    #[serde(default = "default_velocity_gain")]
    pub velocity_gain: f64,
    /// Input trace sampling
    #[serde(default)]
    pub trace: TraceConfig,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            time_range: default_time_range(),
            min_interval_ms: default_min_interval(),
            thresh_stop: default_thresh_stop(),
            max_stop: default_max_stop(),
            alpha_floor: default_alpha_floor(),
            sigma: default_sigma(),
            decay: default_decay(),
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            velocity_gain: default_velocity_gain(),
            trace: TraceConfig::default(),
        }
    }
}

impl PredictorConfig {
    /// Set projection offsets
    pub fn with_time_range(mut self, time_range: Vec<u64>) -> Self {
        self.time_range = time_range;
        self
    }

    /// Set the emitted model
    pub fn with_model(mut self, model: DistModel) -> Self {
        self.model = model;
        self
    }

    /// Set measurement noise
    pub fn with_measurement_noise(mut self, noise: [f64; 6]) -> Self {
        self.measurement_noise = noise;
        self
    }

    /// Set velocity gain
    pub fn with_velocity_gain(mut self, gain: f64) -> Self {
        self.velocity_gain = gain;
        self
    }
}

/// Per-session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session or user name
    #[serde(default = "default_name")]
    pub name: String,
    /// Direct-request mode: explicitly pull on cache miss
    #[serde(default)]
    pub request: bool,
    /// Progressive push mode
    #[serde(default = "default_true")]
    pub progressive: bool,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Predictor configuration
    #[serde(default)]
    pub predictor: PredictorConfig,
    /// Track pushed-but-never-read fragments
    #[serde(default)]
    pub log_over_push: bool,
    /// Record the pointer trace
    #[serde(default)]
    pub log_trace: bool,
    /// Record query registrations
    #[serde(default)]
    pub log_queries: bool,
    /// Record responses delivered to callers
    #[serde(default)]
    pub log_response: bool,
    /// Record fragment-arrival stages
    #[serde(default)]
    pub log_on_block: bool,
    /// Benchmark mode
    #[serde(default)]
    pub macro_test: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            request: false,
            progressive: true,
            cache: CacheConfig::default(),
            predictor: PredictorConfig::default(),
            log_over_push: false,
            log_trace: false,
            log_queries: false,
            log_response: false,
            log_on_block: false,
            macro_test: false,
        }
    }
}

impl SessionConfig {
    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject settings no component can honor
    pub fn validate(&self) -> Result<()> {
        if self.cache.cache_size == 0 {
            return Err(CoreError::Config("cache_size must be positive".into()));
        }
        if self.predictor.min_interval_ms == 0 {
            return Err(CoreError::Config("min_interval_ms must be positive".into()));
        }
        if self.predictor.max_stop <= self.predictor.thresh_stop {
            return Err(CoreError::Config(
                "max_stop must exceed thresh_stop".into(),
            ));
        }
        Ok(())
    }

    /// Set the cache configuration
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the predictor configuration
    pub fn with_predictor(mut self, predictor: PredictorConfig) -> Self {
        self.predictor = predictor;
        self
    }

    /// Enable direct-request mode
    pub fn with_request_mode(mut self, request: bool) -> Self {
        self.request = request;
        self
    }

    /// Enable response, query and over-push recording
    pub fn with_full_logging(mut self) -> Self {
        self.log_queries = true;
        self.log_response = true;
        self.log_over_push = true;
        self
    }

    /// Over-push tracking is forced on in benchmark mode
    pub fn tracks_over_push(&self) -> bool {
        self.log_over_push || self.macro_test
    }

    /// Whether the predictor should run after the session opens
    pub fn runs_predictor(&self) -> bool {
        !self.macro_test && !self.log_trace && !self.request
    }
}

fn default_cache_policy() -> CachePolicy {
    CachePolicy::Lru
}

fn default_cache_size() -> usize {
    10
}

fn default_min_resolution() -> u64 {
    20
}

fn default_trace_length() -> usize {
    30
}

fn default_model() -> DistModel {
    DistModel::LinearGaussianPoint
}

fn default_time_range() -> Vec<u64> {
    vec![100, 200, 500]
}

fn default_min_interval() -> u64 {
    100
}

fn default_thresh_stop() -> f64 {
    5.0
}

fn default_max_stop() -> f64 {
    500.0
}

fn default_alpha_floor() -> f64 {
    1e-14
}

fn default_sigma() -> f64 {
    1.0
}

fn default_decay() -> f64 {
    0.003
}

fn default_process_noise() -> f64 {
    0.1
}

fn default_measurement_noise() -> [f64; 6] {
    [0.1, 0.1, 0.1, 0.1, 0.0, 0.0]
}

fn default_velocity_gain() -> f64 {
    0.6
}

fn default_name() -> String {
    "anon".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.cache.policy, CachePolicy::Lru);
        assert_eq!(config.cache.cache_size, 10);
        assert_eq!(config.predictor.time_range, vec![100, 200, 500]);
        assert_eq!(config.predictor.trace.trace_length, 30);
        assert!(config.runs_predictor());
        assert!(!config.tracks_over_push());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_ring_alias() {
        let config =
            SessionConfig::from_json(r#"{"cache": {"policy": "ringIndex", "cache_size": 4}}"#)
                .unwrap();
        assert_eq!(config.cache, CacheConfig::ring(4));
    }

    #[test]
    fn test_zero_cache_size_rejected() {
        let err = SessionConfig::from_json(r#"{"cache": {"cache_size": 0}}"#).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_macro_test_forces_over_push() {
        let config = SessionConfig {
            macro_test: true,
            ..Default::default()
        };
        assert!(config.tracks_over_push());
        assert!(!config.runs_predictor());
    }

    #[test]
    fn test_request_mode_disables_predictor() {
        let config = SessionConfig::default().with_request_mode(true);
        assert!(!config.runs_predictor());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "sender", "predictor": {{"model": "GM"}}}}"#).unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "sender");
        assert_eq!(config.predictor.model, DistModel::Gaussian);
        assert_eq!(config.predictor.min_interval_ms, 100);
    }
}
