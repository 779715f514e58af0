//! Deterministic replay of a recorded session
//!
//! Frames are applied at a fixed spacing on a manual clock. Pointer samples
//! are fed to the predictor when the clock reaches their timestamp, queries
//! are registered just before their frame, and the predictor ticks at its
//! configured interval of replayed time.

use bytes::Bytes;
use khameleon_core::{
    CoreError, Endpoint, ManualClock, SessionConfig, SessionContext, Summary, TracePoint,
};
use khameleon_engine::{Engine, PrefixApp, Result, Session};
use khameleon_predict::{Input, KalmanPredictor, Predictor};
use khameleon_wire::{read_frame_log, Ack};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::channel::LoggingChannel;

/// A query registered just before frame `at_frame` is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledQuery {
    pub at_frame: usize,
    pub key: String,
}

/// Everything a replay consumes
#[derive(Debug, Clone, Default)]
pub struct ReplayInput {
    pub config: SessionConfig,
    pub frames: Vec<Bytes>,
    pub trace: Vec<TracePoint>,
    pub queries: Vec<ScheduledQuery>,
    /// Replayed time between consecutive frames (ms)
    pub frame_spacing_ms: u64,
}

impl ReplayInput {
    /// Load inputs from disk; absent optional files mean empty inputs
    pub fn load(
        frames: &Path,
        trace: Option<&Path>,
        queries: Option<&Path>,
        config: Option<&Path>,
        frame_spacing_ms: u64,
    ) -> Result<Self> {
        let file = File::open(frames).map_err(CoreError::from)?;
        let frames = read_frame_log(BufReader::new(file))?;
        let trace = match trace {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        let queries = match queries {
            Some(path) => read_json(path)?,
            None => Vec::new(),
        };
        let config = match config {
            Some(path) => SessionConfig::from_file(path)?,
            None => SessionConfig::default(),
        };
        Ok(Self {
            config,
            frames,
            trace,
            queries,
            frame_spacing_ms,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(CoreError::from)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Frames in the log
    pub frames: usize,
    /// Frames decoded and applied
    pub applied: usize,
    pub acks: usize,
    /// Callback invocations across all queries
    pub deliveries: usize,
    /// Distributions posted by the predictor
    pub distributions: usize,
    pub summary: Option<Summary>,
}

/// Replay `input` through a full session.
///
/// Query and response recording is always enabled so a summary can be
/// computed.
pub async fn replay(input: ReplayInput) -> Result<ReplayReport> {
    let config = input.config.with_full_logging();
    let start = input.trace.first().map(|p| p.t.max(0.0) as u64).unwrap_or(0);
    let clock = Arc::new(ManualClock::new(start));
    let ctx = SessionContext::new(config)
        .with_clock(clock.clone())
        .into_shared();

    let control = Arc::new(LoggingChannel::new());
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Ack>();
    let engine = Engine::new(ctx.clone(), PrefixApp::default())?;
    let predictor: Box<dyn Predictor> = Box::new(KalmanPredictor::new(ctx.clone()));
    let interval = predictor.interval().as_millis().max(1) as u64;
    let mut session = Session::new(engine, Some(predictor), control.clone(), Box::new(ack_tx));

    session.open().await?;

    let mut schedule: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for q in input.queries {
        schedule.entry(q.at_frame).or_default().push(q.key);
    }
    let deliveries = Arc::new(AtomicUsize::new(0));
    let frames = input.frames.len();
    let mut applied = 0;
    let mut samples = input.trace.iter().peekable();
    let mut next_tick = start + interval;

    for (i, raw) in input.frames.into_iter().enumerate() {
        let at = start + i as u64 * input.frame_spacing_ms;

        while let Some(sample) = samples.next_if(|p| p.t as u64 <= at) {
            clock.set((sample.t as u64).max(ctx.now()));
            session.observe(Input::Pointer {
                x: sample.x,
                y: sample.y,
                action: sample.action,
            });
        }
        clock.set(at.max(ctx.now()));
        while next_tick <= at {
            if let Err(e) = session.tick().await {
                warn!(error = %e, "Predictor tick failed");
            }
            next_tick += interval;
        }

        for key in schedule.remove(&i).unwrap_or_default() {
            let counter = deliveries.clone();
            let callback = Box::new(move |_: khameleon_engine::Response<Bytes>| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
            session.register_query(key, callback).await?;
        }

        match session.handle_frame(raw).await {
            Ok(Some(_)) => applied += 1,
            Ok(None) => {}
            Err(e) => {
                warn!(frame = i, error = %e, "Replay stopped");
                break;
            }
        }
        if !ctx.is_active() {
            break;
        }
    }

    let summary = session.end().await;
    let mut acks = 0;
    while ack_rx.try_recv().is_ok() {
        acks += 1;
    }
    let report = ReplayReport {
        frames,
        applied,
        acks,
        deliveries: deliveries.load(Ordering::Relaxed),
        distributions: control.count(Endpoint::PostDist),
        summary,
    };
    info!(applied, acks, deliveries = report.deliveries, "Replay finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use khameleon_core::{Action, CacheConfig, Header};
    use khameleon_wire::{encode_frame, write_frame_log};
    use std::io::Write;

    fn frame(index: u32, key: &str, block_id: u32, nblocks: u32) -> Bytes {
        let payload = PrefixApp::encode_block(block_id, b"data");
        encode_frame(index, &Header::new(key, block_id, nblocks), &payload)
    }

    fn input() -> ReplayInput {
        ReplayInput {
            config: SessionConfig::default().with_cache(CacheConfig::ring(16)),
            frames: vec![
                frame(0, "a", 0, 2),
                frame(1, "a", 1, 2),
                frame(2, "b", 0, 1),
            ],
            trace: (0..20)
                .map(|i| TracePoint::new(i as f64, 0.0, 1_000.0 + 20.0 * i as f64, Action::Move))
                .collect(),
            queries: vec![
                ScheduledQuery {
                    at_frame: 1,
                    key: "a".into(),
                },
                ScheduledQuery {
                    at_frame: 2,
                    key: "b".into(),
                },
            ],
            frame_spacing_ms: 150,
        }
    }

    #[tokio::test]
    async fn test_replay_report() {
        let report = replay(input()).await.unwrap();

        assert_eq!(report.frames, 3);
        assert_eq!(report.applied, 3);
        assert_eq!(report.acks, 2);
        // a: hit at 0.5 then 1.0; b: complete on arrival
        assert_eq!(report.deliveries, 3);
        assert!(report.distributions > 0);

        let summary = report.summary.unwrap();
        assert_eq!(summary.cache_hit, 1);
        assert_eq!(summary.cache_miss, 1);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let mut input = input();
        input.frames.insert(1, Bytes::from_static(b"\x01\x00"));
        let report = replay(input).await.unwrap();
        assert_eq!(report.frames, 4);
        assert_eq!(report.applied, 3);
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let frames_path = dir.path().join("frames.log");
        write_frame_log(
            File::create(&frames_path).unwrap(),
            &[frame(0, "a", 0, 1)],
        )
        .unwrap();

        let queries_path = dir.path().join("queries.json");
        File::create(&queries_path)
            .unwrap()
            .write_all(br#"[{"at_frame": 0, "key": "a"}]"#)
            .unwrap();
        let trace_path = dir.path().join("trace.json");
        File::create(&trace_path)
            .unwrap()
            .write_all(br#"[[1.0, 2.0, 100.0, "m"], [3.0, 4.0, 120.0, "d"]]"#)
            .unwrap();

        let input = ReplayInput::load(
            &frames_path,
            Some(&trace_path),
            Some(&queries_path),
            None,
            10,
        )
        .unwrap();
        assert_eq!(input.frames.len(), 1);
        assert_eq!(input.queries[0].key, "a");
        assert_eq!(input.trace[1].action, Action::Down);
        assert_eq!(input.config, SessionConfig::default());
    }
}
