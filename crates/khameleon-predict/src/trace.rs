//! Pointer trace source
//!
//! Keeps a bounded FIFO of pointer samples spaced at least `min_resolution`
//! apart, padding gaps by linear interpolation so the filter sees an evenly
//! sampled path.

use khameleon_core::{Action, Clock, TelemetrySink, TraceConfig, TracePoint};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded, evenly sampled pointer history
#[derive(Debug)]
pub struct TraceLogger {
    config: TraceConfig,
    trace: VecDeque<TracePoint>,
    last_point: Option<TracePoint>,
    clock: Arc<dyn Clock>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl TraceLogger {
    /// Empty trace
    pub fn new(config: TraceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            trace: VecDeque::with_capacity(config.trace_length + 1),
            config,
            last_point: None,
            clock,
            telemetry: None,
        }
    }

    /// Record every retained sample as a session event
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    fn min_resolution(&self) -> f64 {
        self.config.min_resolution_ms as f64
    }

    fn now(&self) -> f64 {
        self.clock.now_millis() as f64
    }

    /// Record one pointer event
    pub fn record(&mut self, x: f64, y: f64, action: Action) {
        match action {
            Action::Move => self.on_move(x, y),
            Action::Down => self.on_down(x, y),
            Action::Up => self.on_up(x, y),
        }
    }

    /// Pointer moved; throttled to one sample per `min_resolution`
    pub fn on_move(&mut self, x: f64, y: f64) {
        let now = self.now();
        let point = TracePoint::new(x, y, now, Action::Move);
        self.last_point = Some(point);
        if let Some(last) = self.trace.back() {
            if now - last.t < self.min_resolution() {
                return;
            }
        }
        self.push(point);
    }

    /// Button pressed
    pub fn on_down(&mut self, x: f64, y: f64) {
        let point = TracePoint::new(x, y, self.now(), Action::Down);
        self.push(point);
    }

    /// Button released
    pub fn on_up(&mut self, x: f64, y: f64) {
        let point = TracePoint::new(x, y, self.now(), Action::Up);
        self.push(point);
    }

    fn push(&mut self, point: TracePoint) {
        self.add_point(point);
        self.truncate();
    }

    /// Append a sample, restarting the trace on a direction reversal and
    /// interpolating across gaps
    pub fn add_point(&mut self, point: TracePoint) {
        let (Some(first), Some(last)) = (self.trace.front().copied(), self.trace.back().copied())
        else {
            self.append(point);
            return;
        };

        if first.distance(&last) > first.distance(&point) {
            self.trace.clear();
            self.trace.push_back(last);
        }

        self.pad(&point, &last);
        self.append(point);
    }

    fn pad(&mut self, point: &TracePoint, last: &TracePoint) {
        if point.t == last.t {
            return;
        }
        let step = self.min_resolution();
        let mut remaining = point.t - last.t;
        let rate = step / remaining;

        while remaining > step {
            let Some(prev) = self.trace.back().copied() else {
                break;
            };
            self.append(TracePoint::new(
                prev.x + rate * (point.x - last.x),
                prev.y + rate * (point.y - last.y),
                prev.t + step,
                Action::Move,
            ));
            remaining -= step;
        }
    }

    fn append(&mut self, point: TracePoint) {
        self.trace.push_back(point);
        if let Some(telemetry) = &self.telemetry {
            telemetry.add_session_event("p", json!(point));
        }
    }

    fn truncate(&mut self) {
        while self.trace.len() > self.config.trace_length {
            self.trace.pop_front();
        }
    }

    /// Current trace, padded up to now when the pointer has been still
    pub fn trace(&mut self) -> Option<Vec<TracePoint>> {
        let last = *self.trace.back()?;
        let now = self.now();
        if now - last.t > self.min_resolution() {
            let still = TracePoint::new(last.x, last.y, now, Action::Move);
            self.pad(&still, &last);
            self.truncate();
        }
        Some(self.trace.iter().copied().collect())
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.trace.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    /// Last raw pointer position, before throttling
    pub fn last_point(&self) -> Option<TracePoint> {
        self.last_point.or_else(|| self.trace.back().copied())
    }

    /// Milliseconds since the pointer last moved
    pub fn stop_delta(&self) -> f64 {
        match self.last_point() {
            Some(p) => self.now() - p.t,
            None => f64::INFINITY,
        }
    }
}
