//! Outstanding-request scheduler
//!
//! Requests are kept in a deque sorted by sequence number (`ridx`). Sequence
//! numbers are assigned from a counter that never goes backwards, and every
//! removal is a prefix cut, so the deque always holds a contiguous run of
//! the most recent requests.

use khameleon_core::{EventType, ResponseRecord, SessionContext, TelemetryEvent};
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Source tag of a request that has not yet been answered
pub const INIT_SOURCE: &str = "init";

/// Artifact handed to a query callback
#[derive(Debug, Clone, PartialEq)]
pub struct Response<R> {
    pub key: String,
    pub render: R,
    pub utility: f64,
    pub cache_hit: bool,
    pub nblocks: u32,
    pub inblocks: u32,
}

/// Query callback; invoked once per strict utility improvement
pub type Callback<R> = Box<dyn FnMut(Response<R>) + Send>;

/// One outstanding query
pub struct Request<R> {
    /// Query key
    pub key: String,
    /// Sequence number
    pub ridx: u64,
    callback: Callback<R>,
    /// Registration time (ms)
    pub stime: u64,
    /// Answered from the cache at registration
    pub cache_hit: bool,
    /// Callback invocations; `-1` once preempted without any
    pub nupcalls: i64,
    /// Best utility delivered so far
    pub max_utility: f64,
    pub nblocks: u32,
    pub inblocks: u32,
    /// What produced the last delivery
    pub source: String,
    /// Re-entrancy guard, set while the request is being processed
    pub busy: bool,
}

impl<R> Request<R> {
    pub(crate) fn deliver(&mut self, response: Response<R>) {
        (self.callback)(response);
    }

    /// A delivery was made without holding the guard
    pub fn is_duplicate(&self) -> bool {
        !self.busy && self.nupcalls > 0
    }

    fn record(&self, now: u64) -> ResponseRecord {
        ResponseRecord {
            query: self.key.clone(),
            cache_hit: self.cache_hit,
            utility: self.max_utility,
            nblocks: self.nblocks,
            inblocks: self.inblocks,
            delay: now.saturating_sub(self.stime),
            dtime: now,
            count: self.nupcalls,
            ridx: self.ridx,
            source: self.source.clone(),
            duplicate: self.is_duplicate(),
            lock: self.busy,
        }
    }
}

impl<R> fmt::Debug for Request<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("key", &self.key)
            .field("ridx", &self.ridx)
            .field("stime", &self.stime)
            .field("cache_hit", &self.cache_hit)
            .field("nupcalls", &self.nupcalls)
            .field("max_utility", &self.max_utility)
            .field("nblocks", &self.nblocks)
            .field("inblocks", &self.inblocks)
            .field("source", &self.source)
            .field("busy", &self.busy)
            .finish()
    }
}

/// Ordered table of outstanding requests
pub struct RequestManager<R> {
    requests: VecDeque<Request<R>>,
    index: HashMap<String, u64>,
    next_ridx: u64,
    ctx: Arc<SessionContext>,
}

impl<R> RequestManager<R> {
    /// Empty table
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            requests: VecDeque::new(),
            index: HashMap::new(),
            next_ridx: 0,
            ctx,
        }
    }

    /// Outstanding requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Sequence number the next request will get
    pub fn next_ridx(&self) -> u64 {
        self.next_ridx
    }

    /// Oldest outstanding sequence number
    pub fn head_ridx(&self) -> Option<u64> {
        self.requests.front().map(|r| r.ridx)
    }

    /// Sequence numbers of all outstanding requests, oldest first
    pub fn ridxs(&self) -> Vec<u64> {
        self.requests.iter().map(|r| r.ridx).collect()
    }

    /// Whether a request for `key` is outstanding
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Create a request; it starts busy with zero utility
    pub fn add_request(&mut self, key: impl Into<String>, callback: Callback<R>) -> u64 {
        let key = key.into();
        let ridx = self.next_ridx;
        self.next_ridx += 1;

        self.index.insert(key.clone(), ridx);
        self.requests.push_back(Request {
            key,
            ridx,
            callback,
            stime: self.ctx.now(),
            cache_hit: false,
            nupcalls: 0,
            max_utility: 0.0,
            nblocks: 0,
            inblocks: 0,
            source: INIT_SOURCE.to_string(),
            busy: true,
        });
        ridx
    }

    /// Look up the request for `key` and mark it busy
    pub fn get_request(&mut self, key: &str) -> Option<&mut Request<R>> {
        let ridx = *self.index.get(key)?;
        let request = self.by_ridx_mut(ridx)?;
        request.busy = true;
        Some(request)
    }

    /// Request by sequence number, without touching the guard
    pub fn by_ridx(&self, ridx: u64) -> Option<&Request<R>> {
        let pos = self.requests.binary_search_by_key(&ridx, |r| r.ridx).ok()?;
        self.requests.get(pos)
    }

    /// Mutable request by sequence number, without touching the guard
    pub fn by_ridx_mut(&mut self, ridx: u64) -> Option<&mut Request<R>> {
        let pos = self.requests.binary_search_by_key(&ridx, |r| r.ridx).ok()?;
        self.requests.get_mut(pos)
    }

    /// Remove every request strictly older than `ridx`.
    ///
    /// Preempted requests are logged with their best-known result and their
    /// callbacks are dropped.
    pub fn preempt_older_than(&mut self, ridx: u64) -> usize {
        let num = self.requests.partition_point(|r| r.ridx < ridx);
        if num == 0 {
            return 0;
        }
        let mut preempted: SmallVec<[Request<R>; 4]> = self.requests.drain(..num).collect();
        for req in preempted.iter_mut() {
            self.unindex(req);
            if req.nupcalls == 0 {
                req.nupcalls = -1;
            }
        }
        debug!(ridx, preempted = num, "Preempted older requests");
        self.log_all(preempted.iter());
        num
    }

    /// Remove a completed request.
    ///
    /// Only the head may be removed. Anything older still queued is an
    /// internal fault: it is reported and removed along with the request.
    /// Returns the number of requests that were ahead of it.
    pub fn rm_request(&mut self, ridx: u64) -> usize {
        let Some(head) = self.head_ridx() else {
            error!(ridx, "Removing request from an empty table");
            return 0;
        };
        let num = ridx.saturating_sub(head) as usize;
        if num != 0 || ridx < head {
            error!(ridx, head, "Removed request is not the oldest outstanding");
        }
        let cut = self.requests.partition_point(|r| r.ridx <= ridx);
        let removed: SmallVec<[Request<R>; 4]> = self.requests.drain(..cut).collect();
        for req in &removed {
            self.unindex(req);
        }
        num
    }

    /// Record a request's current result
    pub fn log(&self, ridx: u64) {
        if let Some(req) = self.by_ridx(ridx) {
            self.log_all(std::iter::once(req));
        }
    }

    /// Log every outstanding request as preempted and clear the table
    pub fn end(&mut self) -> usize {
        let outstanding = self.requests.len();
        debug!(outstanding, "Ending request table");
        let remaining: Vec<Request<R>> = self.requests.drain(..).collect();
        self.index.clear();
        self.log_all(remaining.iter());
        outstanding
    }

    fn unindex(&mut self, req: &Request<R>) {
        if self.index.get(&req.key) == Some(&req.ridx) {
            self.index.remove(&req.key);
        }
    }

    fn log_all<'a>(&self, requests: impl Iterator<Item = &'a Request<R>>)
    where
        R: 'a,
    {
        if !self.ctx.config().log_response {
            return;
        }
        let now = self.ctx.now();
        let telemetry = self.ctx.telemetry();
        for req in requests {
            telemetry.add_event(EventType::Response, TelemetryEvent::Response(req.record(now)));
        }
    }
}

impl<R> fmt::Debug for RequestManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestManager")
            .field("outstanding", &self.requests.len())
            .field("next_ridx", &self.next_ridx)
            .finish()
    }
}
