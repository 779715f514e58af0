//! Data model shared by the codec, caches, predictors and engine

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header carried by every pushed fragment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Logical query key the fragment belongs to
    pub key: String,
    /// Fragment number within the query's artifact
    pub block_id: u32,
    /// Total number of fragments the artifact is split into
    pub nblocks: u32,
}

impl Header {
    /// Create a new header
    pub fn new(key: impl Into<String>, block_id: u32, nblocks: u32) -> Self {
        Self {
            key: key.into(),
            block_id,
            nblocks,
        }
    }
}

/// A cached fragment and the number of live deliveries referencing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Payload bytes
    pub data: Bytes,
    /// Reference count (only meaningful for the ring policy)
    pub count: u32,
}

impl Fragment {
    /// Fragment with a single reference
    pub fn new(data: Bytes) -> Self {
        Self { data, count: 1 }
    }
}

/// Fragments held for one key, ordered by fragment id
pub type FragmentSet = BTreeMap<u32, Fragment>;

/// What a cache returns for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheData {
    /// Live fragments
    pub blocks: FragmentSet,
    /// Total fragment count from the latest header
    pub nblocks: u32,
}

impl CacheData {
    /// Empty entry expecting `nblocks` fragments
    pub fn new(nblocks: u32) -> Self {
        Self {
            blocks: FragmentSet::new(),
            nblocks,
        }
    }

    /// Number of fragments currently held
    pub fn held(&self) -> usize {
        self.blocks.len()
    }

    /// Fragment ids currently held
    pub fn block_ids(&self) -> Vec<u32> {
        self.blocks.keys().copied().collect()
    }
}

/// Pointer action attached to a trace sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Pointer moved
    #[serde(rename = "m")]
    Move,
    /// Button pressed
    #[serde(rename = "d")]
    Down,
    /// Button released
    #[serde(rename = "u")]
    Up,
}

impl Action {
    /// Single-letter wire tag
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Move => "m",
            Action::Down => "d",
            Action::Up => "u",
        }
    }
}

/// One pointer sample: position, time in milliseconds, and action.
///
/// Serialized as the compact tuple `[x, y, t, "m"]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, f64, Action)", into = "(f64, f64, f64, Action)")]
pub struct TracePoint {
    pub x: f64,
    pub y: f64,
    pub t: f64,
    pub action: Action,
}

impl TracePoint {
    /// Create a sample
    pub fn new(x: f64, y: f64, t: f64, action: Action) -> Self {
        Self { x, y, t, action }
    }

    /// Euclidean distance to another sample
    pub fn distance(&self, other: &TracePoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f64, f64, f64, Action)> for TracePoint {
    fn from((x, y, t, action): (f64, f64, f64, Action)) -> Self {
        Self { x, y, t, action }
    }
}

impl From<TracePoint> for (f64, f64, f64, Action) {
    fn from(p: TracePoint) -> Self {
        (p.x, p.y, p.t, p.action)
    }
}

/// Screen rectangle of a named region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Bounds {
    /// Create a rectangle
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// Application layout: region name to rectangle
pub type Layout = BTreeMap<String, Bounds>;
