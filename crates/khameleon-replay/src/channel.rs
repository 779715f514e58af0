//! Control channel that logs instead of talking to a server

use async_trait::async_trait;
use khameleon_core::{ControlChannel, Endpoint, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, trace};

/// Accepts every post, answers initialization with an empty document and
/// counts posts per endpoint
#[derive(Debug, Default)]
pub struct LoggingChannel {
    counts: Mutex<HashMap<Endpoint, usize>>,
}

impl LoggingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts made to `endpoint`
    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&endpoint)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ControlChannel for LoggingChannel {
    async fn post(&self, endpoint: Endpoint, body: Value) -> Result<Option<Value>> {
        *self
            .counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(endpoint)
            .or_default() += 1;

        match endpoint {
            Endpoint::PostDist => trace!(endpoint = endpoint.path(), %body, "post"),
            _ => debug!(endpoint = endpoint.path(), %body, "post"),
        }
        Ok(match endpoint {
            Endpoint::InitApp => Some(json!({})),
            _ => None,
        })
    }
}
