//! Explicit per-session context

use crate::{Clock, SessionConfig, SystemClock, SystemLogger, TelemetrySink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// State shared by every component of one session.
///
/// Created at startup, passed by `Arc` into the engine, caches and
/// predictors, and torn down with [`SessionContext::end`]. The `active`
/// flag gates periodic producers: once a transport send fails it is
/// cleared and no further predictor or telemetry work is issued.
#[derive(Debug)]
pub struct SessionContext {
    config: SessionConfig,
    active: AtomicBool,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl SessionContext {
    /// Context with the system clock and an in-memory recorder
    pub fn new(config: SessionConfig) -> Self {
        let telemetry = Arc::new(SystemLogger::new(
            config.tracks_over_push(),
            config.log_queries,
        ));
        Self {
            config,
            active: AtomicBool::new(false),
            clock: Arc::new(SystemClock),
            telemetry,
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Wrap for sharing
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Telemetry sink
    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Clock
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time in milliseconds
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Whether the session is running
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the session as running
    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!(session = %self.config.name, "Session active");
        }
    }

    /// Stop periodic producers after a transport failure
    pub fn deactivate(&self, reason: &str) {
        if self.active.swap(false, Ordering::SeqCst) {
            warn!(session = %self.config.name, reason, "Session deactivated");
        }
    }

    /// Tear the session down
    pub fn end(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(session = %self.config.name, "Session ended");
        }
    }
}
