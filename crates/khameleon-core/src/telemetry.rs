//! Telemetry sink contract and the in-memory session recorder
//!
//! Telemetry is optional: every producer talks to a [`TelemetrySink`], and
//! [`NullTelemetry`] discards everything. [`SystemLogger`] keeps events per
//! [`EventType`], tracks whether pushed fragments were ever read before
//! eviction ("over-push"), and produces the end-of-session [`Summary`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Kinds of recorded events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Response,
    OnBlock,
    Query,
    NewState,
    Predictor,
    OverPush,
    ThinkTime,
    Network,
    Write,
    Open,
}

impl EventType {
    /// Name used as the document key
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Response => "Response",
            EventType::OnBlock => "OnBlock",
            EventType::Query => "Query",
            EventType::NewState => "NewState",
            EventType::Predictor => "Predictor",
            EventType::OverPush => "OverPush",
            EventType::ThinkTime => "ThinkTime",
            EventType::Network => "Network",
            EventType::Write => "Write",
            EventType::Open => "Open",
        }
    }
}

/// A response delivered to (or withheld from) a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub query: String,
    #[serde(rename = "cachehit")]
    pub cache_hit: bool,
    pub utility: f64,
    pub nblocks: u32,
    pub inblocks: u32,
    /// Milliseconds since registration
    pub delay: u64,
    pub dtime: u64,
    /// Upcall count; `-1` marks a request preempted before any upcall
    pub count: i64,
    #[serde(rename = "qid")]
    pub ridx: u64,
    #[serde(rename = "fn")]
    pub source: String,
    pub duplicate: bool,
    pub lock: bool,
}

/// A query registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    #[serde(rename = "qid")]
    pub ridx: u64,
    pub dtime: u64,
}

/// A stage of fragment handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnBlockRecord {
    #[serde(rename = "fn")]
    pub stage: String,
    pub data: String,
    pub bid: Option<u32>,
    pub time: u64,
}

/// Pushed fragments evicted without ever being read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverPushRecord {
    pub missed: u64,
    pub total: u64,
}

impl OverPushRecord {
    /// Fraction of pushed fragments that were wasted
    pub fn waste_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.missed as f64 / self.total as f64
        }
    }
}

/// End-of-session aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub avg_util: f64,
    pub avg_delay: f64,
    #[serde(rename = "cachehit")]
    pub cache_hit: usize,
    #[serde(rename = "cacheMiss")]
    pub cache_miss: usize,
    /// `-1` when queries were not recorded
    pub preempted: i64,
}

/// A recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryEvent {
    Response(ResponseRecord),
    Query(QueryRecord),
    OnBlock(OnBlockRecord),
    OverPush(OverPushRecord),
    Timestamp { timestamp: u64 },
    Other(Value),
}

/// Consumer of discrete named events.
///
/// Every method has a no-op default; a sink must never block its caller.
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Record one event
    fn add_event(&self, etype: EventType, event: TelemetryEvent);

    /// Record a session-trace event (pointer samples, layout and state changes)
    fn add_session_event(&self, _etype: &str, _payload: Value) {}

    /// A fragment was pushed into the cache
    fn add_block(&self, _key: &str, _block_id: u32) {}

    /// Fragments were read from the cache
    fn tag_blocks(&self, _key: &str, _block_ids: &[u32]) {}

    /// A fragment reference was evicted; `remaining` is its count afterwards
    fn evict_block(&self, _key: &str, _block_id: u32, _remaining: u32) {}

    /// Finalize and return the event document
    fn write_events(&self, _now: u64) -> Option<Value> {
        None
    }

    /// Return the session-trace document
    fn trace_document(&self, _name: &str, _now: u64) -> Option<Value> {
        None
    }

    /// Current summary, if enough was recorded to compute one
    fn summary(&self) -> Option<Summary> {
        None
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn add_event(&self, _etype: EventType, _event: TelemetryEvent) {}
}

#[derive(Debug, Clone, Serialize)]
struct SessionEvent {
    etype: String,
    e: Value,
}

/// In-memory event recorder
#[derive(Default)]
pub struct SystemLogger {
    events: DashMap<EventType, Vec<TelemetryEvent>>,
    trace: Mutex<Vec<SessionEvent>>,
    block_tags: Option<DashMap<(String, u32), bool>>,
    blocks_count: AtomicU64,
    blocks_missed: AtomicU64,
    log_queries: bool,
}

impl fmt::Debug for SystemLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemLogger")
            .field("event_types", &self.events.len())
            .field("tracks_over_push", &self.block_tags.is_some())
            .field("blocks_count", &self.blocks_count.load(Ordering::Relaxed))
            .field("blocks_missed", &self.blocks_missed.load(Ordering::Relaxed))
            .finish()
    }
}

impl SystemLogger {
    /// Create a recorder
    pub fn new(track_over_push: bool, log_queries: bool) -> Self {
        Self {
            block_tags: track_over_push.then(DashMap::new),
            log_queries,
            ..Default::default()
        }
    }

    /// Events of one type, in recording order
    pub fn events(&self, etype: EventType) -> Vec<TelemetryEvent> {
        self.events
            .get(&etype)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    /// Number of events of one type
    pub fn count(&self, etype: EventType) -> usize {
        self.events.get(&etype).map(|v| v.len()).unwrap_or(0)
    }

    /// Recorded responses
    pub fn responses(&self) -> Vec<ResponseRecord> {
        self.events(EventType::Response)
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::Response(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Over-push counters
    pub fn over_push(&self) -> OverPushRecord {
        OverPushRecord {
            missed: self.blocks_missed.load(Ordering::Relaxed),
            total: self.blocks_count.load(Ordering::Relaxed),
        }
    }

    fn compute_summary(&self) -> Option<Summary> {
        if self.count(EventType::Response) == 0 || self.count(EventType::Query) == 0 {
            return None;
        }
        let queries = self.count(EventType::Query);
        let responses = self.responses();

        let first_hits: Vec<&ResponseRecord> = responses
            .iter()
            .filter(|r| r.count == 1 && !r.duplicate)
            .collect();
        let preempted: Vec<&ResponseRecord> = responses
            .iter()
            .filter(|r| (r.count == -1 || r.count == 0) && !r.duplicate)
            .collect();

        let avg_util = mean(first_hits.iter().map(|r| r.utility));
        let avg_delay = mean(
            first_hits
                .iter()
                .chain(preempted.iter())
                .map(|r| r.delay as f64),
        );
        let cache_hit = first_hits.iter().filter(|r| r.cache_hit).count();

        Some(Summary {
            avg_util,
            avg_delay,
            cache_hit,
            cache_miss: queries.saturating_sub(cache_hit),
            preempted: if self.log_queries {
                queries as i64 - first_hits.len() as i64
            } else {
                -1
            },
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

impl TelemetrySink for SystemLogger {
    fn add_event(&self, etype: EventType, event: TelemetryEvent) {
        self.events.entry(etype).or_default().push(event);
    }

    fn add_session_event(&self, etype: &str, payload: Value) {
        let mut trace = self.trace.lock().unwrap_or_else(|e| e.into_inner());
        trace.push(SessionEvent {
            etype: etype.to_string(),
            e: payload,
        });
    }

    fn add_block(&self, key: &str, block_id: u32) {
        if let Some(tags) = &self.block_tags {
            tags.insert((key.to_string(), block_id), false);
            self.blocks_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn tag_blocks(&self, key: &str, block_ids: &[u32]) {
        if let Some(tags) = &self.block_tags {
            for id in block_ids {
                tags.insert((key.to_string(), *id), true);
            }
        }
    }

    fn evict_block(&self, key: &str, block_id: u32, remaining: u32) {
        let Some(tags) = &self.block_tags else {
            return;
        };
        let tag = (key.to_string(), block_id);
        let used = tags.get(&tag).map(|v| *v).unwrap_or(false);
        if !used {
            self.blocks_missed.fetch_add(1, Ordering::Relaxed);
        }
        if remaining == 0 {
            tags.remove(&tag);
        } else {
            tags.insert(tag, false);
        }
    }

    fn write_events(&self, now: u64) -> Option<Value> {
        self.events
            .insert(EventType::Write, vec![TelemetryEvent::Timestamp { timestamp: now }]);
        if self.block_tags.is_some() {
            self.events.insert(
                EventType::OverPush,
                vec![TelemetryEvent::OverPush(self.over_push())],
            );
        }

        let mut sorted: BTreeMap<&'static str, Value> = BTreeMap::new();
        for entry in self.events.iter() {
            sorted.insert(
                entry.key().as_str(),
                serde_json::to_value(entry.value()).unwrap_or(Value::Null),
            );
        }
        let mut data: Map<String, Value> = sorted
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        if let Some(summary) = self.compute_summary() {
            data.insert(
                "summary".to_string(),
                json!([serde_json::to_value(summary).unwrap_or(Value::Null)]),
            );
        }
        Some(json!({ "data": data }))
    }

    fn trace_document(&self, name: &str, now: u64) -> Option<Value> {
        let trace = self.trace.lock().unwrap_or_else(|e| e.into_inner());
        Some(json!({
            "file": format!("session-{name}-{now}.log"),
            "data": serde_json::to_value(&*trace).unwrap_or(Value::Null),
        }))
    }

    fn summary(&self) -> Option<Summary> {
        self.compute_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(count: i64, utility: f64, delay: u64, cache_hit: bool, duplicate: bool) -> TelemetryEvent {
        TelemetryEvent::Response(ResponseRecord {
            query: "q".into(),
            cache_hit,
            utility,
            nblocks: 4,
            inblocks: (utility * 4.0) as u32,
            delay,
            dtime: 0,
            count,
            ridx: 0,
            source: "cache".into(),
            duplicate,
            lock: true,
        })
    }

    fn query(ridx: u64) -> TelemetryEvent {
        TelemetryEvent::Query(QueryRecord {
            query: format!("q{ridx}"),
            ridx,
            dtime: 0,
        })
    }

    #[test]
    fn test_summary_requires_queries_and_responses() {
        let logger = SystemLogger::new(false, true);
        logger.add_event(EventType::Query, query(0));
        assert!(logger.summary().is_none());
    }

    #[test]
    fn test_summary_first_hits_and_preempted() {
        let logger = SystemLogger::new(false, true);
        for i in 0..3 {
            logger.add_event(EventType::Query, query(i));
        }
        logger.add_event(EventType::Response, response(1, 0.5, 10, true, false));
        logger.add_event(EventType::Response, response(2, 1.0, 40, false, false));
        logger.add_event(EventType::Response, response(1, 1.0, 30, false, false));
        logger.add_event(EventType::Response, response(-1, 0.0, 20, false, false));
        // duplicates never count
        logger.add_event(EventType::Response, response(1, 0.25, 1000, false, true));

        let summary = logger.summary().unwrap();
        assert!((summary.avg_util - 0.75).abs() < 1e-12);
        assert!((summary.avg_delay - 20.0).abs() < 1e-12);
        assert_eq!(summary.cache_hit, 1);
        assert_eq!(summary.cache_miss, 2);
        assert_eq!(summary.preempted, 1);
    }

    #[test]
    fn test_preempted_unknown_without_query_logging() {
        let logger = SystemLogger::new(false, false);
        logger.add_event(EventType::Query, query(0));
        logger.add_event(EventType::Response, response(1, 1.0, 5, false, false));
        assert_eq!(logger.summary().unwrap().preempted, -1);
    }

    #[test]
    fn test_over_push_accounting() {
        let logger = SystemLogger::new(true, false);
        logger.add_block("a", 0);
        logger.add_block("a", 1);
        logger.tag_blocks("a", &[0]);

        logger.evict_block("a", 0, 0);
        logger.evict_block("a", 1, 0);

        let record = logger.over_push();
        assert_eq!(record.total, 2);
        assert_eq!(record.missed, 1);
        assert!((record.waste_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_evict_with_remaining_refs_resets_tag() {
        let logger = SystemLogger::new(true, false);
        logger.add_block("a", 0);
        logger.add_block("a", 0);
        logger.tag_blocks("a", &[0]);

        logger.evict_block("a", 0, 1);
        assert_eq!(logger.over_push().missed, 0);
        // the surviving reference was never read
        logger.evict_block("a", 0, 0);
        assert_eq!(logger.over_push().missed, 1);
    }

    #[test]
    fn test_over_push_disabled_counts_nothing() {
        let logger = SystemLogger::new(false, false);
        logger.add_block("a", 0);
        logger.evict_block("a", 0, 0);
        assert_eq!(logger.over_push(), OverPushRecord::default());
    }

    #[test]
    fn test_write_events_document() {
        let logger = SystemLogger::new(true, true);
        logger.add_event(EventType::Query, query(0));
        logger.add_event(EventType::Response, response(1, 1.0, 12, true, false));

        let doc = logger.write_events(99).unwrap();
        let data = &doc["data"];
        assert_eq!(data["Write"][0]["timestamp"], 99);
        assert_eq!(data["OverPush"][0]["total"], 0);
        assert_eq!(data["summary"][0]["cachehit"], 1);
        assert_eq!(data["Response"][0]["qid"], 0);
        assert_eq!(data["Response"][0]["fn"], "cache");
    }

    #[test]
    fn test_trace_document() {
        let logger = SystemLogger::new(false, false);
        logger.add_session_event("p", json!([1.0, 2.0, 3.0, "m"]));
        let doc = logger.trace_document("alice", 7).unwrap();
        assert_eq!(doc["file"], "session-alice-7.log");
        assert_eq!(doc["data"][0]["etype"], "p");
    }

    #[test]
    fn test_null_telemetry_is_inert() {
        let sink = NullTelemetry;
        sink.add_event(EventType::Open, TelemetryEvent::Timestamp { timestamp: 1 });
        assert!(sink.write_events(1).is_none());
        assert!(sink.summary().is_none());
    }
}
