//! Cache contract and write/read/evict hooks

use bytes::Bytes;
use khameleon_core::{CacheData, CachePolicy, Header, TelemetrySink};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::CacheStats;

/// Source tag attached to fragment-arrival notifications
pub const CACHE_SOURCE: &str = "cache";

/// Notification that a fragment was ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    /// Query key the fragment belongs to
    pub key: String,
    /// Where the fragment came from
    pub source: &'static str,
    /// Frame index it arrived in
    pub frame_index: u32,
}

/// Sending half for block notifications
pub type BlockNotifier = mpsc::UnboundedSender<BlockEvent>;

/// Fragment store.
///
/// `write` ingests one fragment and emits exactly one [`BlockEvent`]. `get`
/// returns the live fragment set and total count, or `None` on a miss.
pub trait FragmentCache: Send + fmt::Debug {
    /// Ingest one fragment
    fn write(&mut self, data: Bytes, header: &Header, frame_index: u32);

    /// Current fragments for a key
    fn get(&mut self, key: &str) -> Option<CacheData>;

    /// Whether the key is held, without touching recency or telemetry
    fn contains(&self, key: &str) -> bool;

    /// Live keys
    fn len(&self) -> usize;

    /// Whether nothing is held
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity
    fn capacity(&self) -> usize;

    /// Eviction policy
    fn policy(&self) -> CachePolicy;

    /// Statistics snapshot
    fn stats(&self) -> CacheStats;
}

/// Observers attached to a cache
#[derive(Debug, Clone, Default)]
pub struct CacheHooks {
    notifier: Option<BlockNotifier>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl CacheHooks {
    /// No observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver block events to `notifier`
    pub fn with_notifier(mut self, notifier: BlockNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Report fragment writes, reads and evictions for over-push accounting
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub(crate) fn written(&self, key: &str, block_id: u32, frame_index: u32) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.add_block(key, block_id);
        }
        if let Some(notifier) = &self.notifier {
            let event = BlockEvent {
                key: key.to_string(),
                source: CACHE_SOURCE,
                frame_index,
            };
            if notifier.send(event).is_err() {
                debug!(key, frame_index, "Block observer gone, notification dropped");
            }
        }
    }

    pub(crate) fn read(&self, key: &str, data: &CacheData) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.tag_blocks(key, &data.block_ids());
        }
    }

    pub(crate) fn evicted(&self, key: &str, block_id: u32, remaining: u32) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.evict_block(key, block_id, remaining);
        }
    }
}
