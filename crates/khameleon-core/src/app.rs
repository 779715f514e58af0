//! Application adapter contract

use crate::FragmentSet;
use serde_json::Value;

/// Result of reconstructing an artifact from the fragments at hand
#[derive(Debug, Clone, PartialEq)]
pub struct Construct<R> {
    /// Artifact handed to the query callback
    pub render: R,
    /// Number of fragments that contributed
    pub inblocks: u32,
}

/// Application-specific reconstruction.
///
/// The engine never interprets fragment payloads itself; it asks the app how
/// many of the held fragments are usable and derives utility from that.
pub trait App: Send {
    /// Artifact type delivered to callbacks
    type Render: Send;

    /// Initial application state posted when the session opens
    fn get_state(&self) -> Value;

    /// Server acknowledged initialization
    fn on_open(&mut self, _payload: &Value) {}

    /// Normalize a key read off the wire
    fn decode_key(&self, raw: &str) -> String {
        raw.to_string()
    }

    /// Build an artifact from the current fragment set
    fn construct(&mut self, key: &str, blocks: &FragmentSet, nblocks: u32) -> Construct<Self::Render>;
}
