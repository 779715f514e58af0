//! Progressive reconstruction: cache notifications to query callbacks

use khameleon_cache::{create_cache, BlockEvent, CacheHooks, FragmentCache};
use khameleon_core::{
    App, CacheData, EventType, Header, OnBlockRecord, QueryRecord, SessionContext,
    TelemetryEvent,
};
use khameleon_wire::Frame;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Callback, RequestManager, Response, Result};

/// Source tag of a delivery made while registering a query
pub const REGISTER_SOURCE: &str = "register";

/// What happened to a registered query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Same key is already the latest outstanding query
    Duplicate { ridx: u64 },
    /// Answered from the cache
    Hit { ridx: u64 },
    /// Waiting for fragments; `pull` asks the caller to request them
    Miss { ridx: u64, pull: bool },
}

impl Registration {
    pub fn ridx(&self) -> u64 {
        match *self {
            Registration::Duplicate { ridx }
            | Registration::Hit { ridx }
            | Registration::Miss { ridx, .. } => ridx,
        }
    }
}

/// Result of one reconstruction attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// No strict utility improvement; nothing delivered
    Discarded,
    /// Callback invoked
    Delivered {
        utility: f64,
        preempted: usize,
        completed: bool,
    },
}

/// Ties the cache, the request table and the app adapter together.
///
/// Every fragment write produces one [`BlockEvent`]; [`Engine::ingest`]
/// drains them in arrival order so each one is resolved against the request
/// table before the next frame is applied.
pub struct Engine<A: App> {
    app: A,
    cache: Box<dyn FragmentCache>,
    events: mpsc::UnboundedReceiver<BlockEvent>,
    requests: RequestManager<A::Render>,
    last_query: Option<String>,
    ctx: Arc<SessionContext>,
}

impl<A: App> Engine<A> {
    /// Build the configured cache and wire its notifications to the engine
    pub fn new(ctx: Arc<SessionContext>, app: A) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hooks = CacheHooks::new().with_notifier(tx);
        if ctx.config().tracks_over_push() {
            hooks = hooks.with_telemetry(ctx.telemetry().clone());
        }
        let cache = create_cache(&ctx.config().cache, hooks)?;

        Ok(Self {
            app,
            cache,
            events: rx,
            requests: RequestManager::new(ctx.clone()),
            last_query: None,
            ctx,
        })
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn cache(&self) -> &dyn FragmentCache {
        self.cache.as_ref()
    }

    pub fn requests(&self) -> &RequestManager<A::Render> {
        &self.requests
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Register interest in `key`.
    ///
    /// A cache hit is answered synchronously through `callback`. On a miss
    /// the request waits for pushed fragments; in direct-request mode the
    /// result asks the caller to pull.
    pub fn register_query(
        &mut self,
        key: impl Into<String>,
        callback: Callback<A::Render>,
    ) -> Registration {
        let key = key.into();
        if self.last_query.as_deref() == Some(key.as_str()) {
            if let Some(req) = self.requests.get_request(&key) {
                req.busy = false;
                let ridx = req.ridx;
                debug!(key = %key, ridx, "Query already outstanding");
                return Registration::Duplicate { ridx };
            }
        }

        let ridx = self.requests.add_request(key.clone(), callback);
        self.last_query = Some(key.clone());

        let config = self.ctx.config();
        if config.log_trace || config.log_queries {
            self.ctx.telemetry().add_event(
                EventType::Query,
                TelemetryEvent::Query(QueryRecord {
                    query: key.clone(),
                    ridx,
                    dtime: self.ctx.now(),
                }),
            );
        }

        match self.cache.get(&key) {
            Some(data) => {
                if let Some(req) = self.requests.by_ridx_mut(ridx) {
                    req.cache_hit = true;
                }
                self.handle_request(ridx, data, REGISTER_SOURCE, None);
                Registration::Hit { ridx }
            }
            None => {
                if let Some(req) = self.requests.by_ridx_mut(ridx) {
                    req.busy = false;
                }
                Registration::Miss {
                    ridx,
                    pull: self.ctx.config().request,
                }
            }
        }
    }

    /// Apply a decoded frame and resolve its notification
    pub fn ingest(&mut self, frame: Frame) -> usize {
        let key = self.app.decode_key(&frame.header.key);
        let header = Header::new(key, frame.header.block_id, frame.header.nblocks);
        self.cache.write(frame.payload, &header, frame.frame_index);
        self.drain_events()
    }

    /// Resolve every pending block notification in arrival order
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.on_block(event);
            handled += 1;
        }
        handled
    }

    /// A fragment for `event.key` arrived.
    ///
    /// Fragments for queries that already completed or were preempted are
    /// dropped silently.
    pub fn on_block(&mut self, event: BlockEvent) -> Option<Outcome> {
        let bid = Some(event.frame_index);
        self.stage("onblock@start", &event.key, bid);

        let ridx = self.requests.get_request(&event.key)?.ridx;

        let data = self.cache.get(&event.key);
        self.stage("onblock@cache.get", &event.key, bid);

        let outcome = match data {
            Some(data) => Some(self.handle_request(ridx, data, event.source, bid)),
            None => {
                if let Some(req) = self.requests.by_ridx_mut(ridx) {
                    req.busy = false;
                }
                None
            }
        };
        self.stage("onblock@end", &event.key, bid);
        outcome
    }

    /// Reconstruct from `data` and deliver if utility strictly improved.
    ///
    /// The request's busy flag is cleared on every path.
    pub fn handle_request(
        &mut self,
        ridx: u64,
        data: CacheData,
        source: &str,
        frame_index: Option<u32>,
    ) -> Outcome {
        let Some(req) = self.requests.by_ridx(ridx) else {
            return Outcome::Discarded;
        };
        let key = req.key.clone();
        if frame_index.is_some() {
            self.stage("handlerequest@start", &format!("{req:?}"), frame_index);
        }

        let built = self.app.construct(&key, &data.blocks, data.nblocks);
        let utility = if data.nblocks == 0 {
            0.0
        } else {
            f64::from(built.inblocks) / f64::from(data.nblocks)
        };
        if frame_index.is_some() {
            self.stage("handlerequest@postconstruct", &built.inblocks.to_string(), frame_index);
        }

        let Some(req) = self.requests.by_ridx_mut(ridx) else {
            return Outcome::Discarded;
        };
        if req.max_utility >= utility || req.inblocks >= built.inblocks {
            req.busy = false;
            if req.nupcalls == 0 && req.cache_hit {
                req.cache_hit = false;
            }
            return Outcome::Discarded;
        }

        let preempted = self.requests.preempt_older_than(ridx);
        if frame_index.is_some() {
            self.stage("handlerequest@postpreempt", &preempted.to_string(), frame_index);
        }

        let Some(req) = self.requests.by_ridx_mut(ridx) else {
            return Outcome::Discarded;
        };
        req.source = source.to_string();
        req.max_utility = utility;
        req.inblocks = built.inblocks;
        req.nblocks = data.nblocks;
        req.nupcalls += 1;
        let response = Response {
            key,
            render: built.render,
            utility,
            cache_hit: req.cache_hit,
            nblocks: data.nblocks,
            inblocks: built.inblocks,
        };
        req.deliver(response);
        self.requests.log(ridx);

        let completed = utility >= 1.0;
        if completed {
            if let Some(req) = self.requests.by_ridx_mut(ridx) {
                req.busy = false;
            }
            let removed = self.requests.rm_request(ridx);
            if frame_index.is_some() {
                self.stage("handlerequest@postrm", &removed.to_string(), frame_index);
            }
        } else if let Some(req) = self.requests.by_ridx_mut(ridx) {
            req.busy = false;
        }

        Outcome::Delivered {
            utility,
            preempted,
            completed,
        }
    }

    /// Log outstanding requests as preempted
    pub fn end(&mut self) -> usize {
        self.requests.end()
    }

    fn stage(&self, stage: &str, data: &str, bid: Option<u32>) {
        if !self.ctx.config().log_on_block {
            return;
        }
        self.ctx.telemetry().add_event(
            EventType::OnBlock,
            TelemetryEvent::OnBlock(OnBlockRecord {
                stage: stage.to_string(),
                data: data.to_string(),
                bid,
                time: self.ctx.now(),
            }),
        );
    }
}

impl<A: App> std::fmt::Debug for Engine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cache", &self.cache)
            .field("requests", &self.requests)
            .field("last_query", &self.last_query)
            .finish()
    }
}
