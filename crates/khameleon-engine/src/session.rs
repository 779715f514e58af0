//! Async session driver
//!
//! Owns the engine and the predictor and multiplexes three event sources on
//! one task: pushed frames, caller commands, and the predictor tick.

use async_trait::async_trait;
use bytes::Bytes;
use khameleon_core::{
    App, ControlChannel, Endpoint, EventType, Layout, SessionContext, Summary, TelemetryEvent,
};
use khameleon_predict::{Input, Predictor};
use khameleon_wire::{decode_frame, Ack};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{Callback, Engine, EngineError, Registration, Result};

/// Destination of frame acknowledgements
#[async_trait]
pub trait AckSink: Send {
    /// Acknowledge one frame
    async fn send_ack(&mut self, ack: Ack) -> Result<()>;
}

#[async_trait]
impl AckSink for mpsc::Sender<Ack> {
    async fn send_ack(&mut self, ack: Ack) -> Result<()> {
        self.send(ack)
            .await
            .map_err(|_| EngineError::ChannelClosed("ack"))
    }
}

#[async_trait]
impl AckSink for mpsc::UnboundedSender<Ack> {
    async fn send_ack(&mut self, ack: Ack) -> Result<()> {
        self.send(ack).map_err(|_| EngineError::ChannelClosed("ack"))
    }
}

/// Requests handled by the session loop
pub enum SessionCommand<R> {
    /// Register a query
    Query { key: String, callback: Callback<R> },
    /// Feed user input to the predictor
    Input(Input),
    /// Application layout changed
    Layout(Layout),
    /// Application state changed
    AppState(Value),
    /// Stop the loop
    Stop,
}

impl<R> std::fmt::Debug for SessionCommand<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Query { key, .. } => f.debug_struct("Query").field("key", key).finish(),
            SessionCommand::Input(input) => f.debug_tuple("Input").field(input).finish(),
            SessionCommand::Layout(layout) => f.debug_tuple("Layout").field(layout).finish(),
            SessionCommand::AppState(state) => f.debug_tuple("AppState").field(state).finish(),
            SessionCommand::Stop => f.write_str("Stop"),
        }
    }
}

/// One client session
pub struct Session<A: App> {
    engine: Engine<A>,
    predictor: Option<Box<dyn Predictor>>,
    predicting: bool,
    control: Arc<dyn ControlChannel>,
    acks: Box<dyn AckSink>,
    ctx: Arc<SessionContext>,
}

impl<A: App> Session<A> {
    /// Session over an engine; the predictor is optional
    pub fn new(
        engine: Engine<A>,
        predictor: Option<Box<dyn Predictor>>,
        control: Arc<dyn ControlChannel>,
        acks: Box<dyn AckSink>,
    ) -> Self {
        let ctx = engine.context().clone();
        Self {
            engine,
            predictor,
            predicting: false,
            control,
            acks,
            ctx,
        }
    }

    pub fn engine(&self) -> &Engine<A> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<A> {
        &mut self.engine
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Whether the predictor tick is running
    pub fn is_predicting(&self) -> bool {
        self.predicting
    }

    /// Initialize the app on the server and start processing
    pub async fn open(&mut self) -> Result<()> {
        let state = self.engine.app().get_state();
        let reply = post(self.control.as_ref(), &self.ctx, Endpoint::InitApp, state).await?;
        self.engine.app_mut().on_open(&reply.unwrap_or(Value::Null));
        self.ctx.telemetry().add_event(
            EventType::Open,
            TelemetryEvent::Timestamp {
                timestamp: self.ctx.now(),
            },
        );

        post(self.control.as_ref(), &self.ctx, Endpoint::StartThreads, json!({})).await?;
        self.ctx.activate();
        self.predicting = self.ctx.config().runs_predictor() && self.predictor.is_some();
        info!(
            session = %self.ctx.config().name,
            predicting = self.predicting,
            "Session opened"
        );
        Ok(())
    }

    /// Register a query, pulling it explicitly in direct-request mode
    pub async fn register_query(
        &mut self,
        key: impl Into<String>,
        callback: Callback<A::Render>,
    ) -> Result<Registration> {
        let key = key.into();
        let registration = self.engine.register_query(key.clone(), callback);
        if let Registration::Miss { pull: true, .. } = registration {
            debug!(key = %key, "Cache miss, pulling");
            let body = json!({ "query": key, "rtype": false });
            post(self.control.as_ref(), &self.ctx, Endpoint::Request, body).await?;
        }
        Ok(registration)
    }

    /// Feed user input to the predictor
    pub fn observe(&mut self, input: Input) {
        if let Some(predictor) = self.predictor.as_mut() {
            predictor.observe(input);
        }
    }

    /// Forward a layout change to the predictor
    pub fn on_layout(&mut self, layout: Layout) {
        if let Some(predictor) = self.predictor.as_mut() {
            predictor.on_layout(layout);
        }
    }

    /// Forward an application-state change to the predictor
    pub fn on_app_state(&mut self, state: Value) {
        if let Some(predictor) = self.predictor.as_mut() {
            predictor.on_app_state(state);
        }
    }

    /// Refit the predictor and post its distribution.
    ///
    /// Returns whether a distribution was posted.
    pub async fn tick(&mut self) -> Result<bool> {
        if !self.predicting {
            return Ok(false);
        }
        let Some(predictor) = self.predictor.as_mut() else {
            return Ok(false);
        };
        if !predictor.update_state()? || !self.ctx.is_active() {
            return Ok(false);
        }
        let Some(prediction) = predictor.serialize() else {
            return Ok(false);
        };
        let body = prediction.to_json()?;
        post(self.control.as_ref(), &self.ctx, Endpoint::PostDist, body).await?;
        Ok(true)
    }

    /// Decode, apply and acknowledge one pushed frame.
    ///
    /// Malformed frames are dropped. Returns the frame index when applied.
    pub async fn handle_frame(&mut self, raw: Bytes) -> Result<Option<u32>> {
        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return Ok(None);
            }
        };
        let frame_index = frame.frame_index;
        self.engine.ingest(frame);

        if let Some(ack) = Ack::for_frame(frame_index, self.ctx.now()) {
            if let Err(e) = self.acks.send_ack(ack).await {
                warn!(frame_index, error = %e, "Acknowledgement failed");
                self.ctx.deactivate("ack channel closed");
                return Err(e);
            }
        }
        Ok(Some(frame_index))
    }

    /// Drive the session until the frame stream closes, a stop command
    /// arrives, or the session is deactivated
    pub async fn run(
        &mut self,
        mut frames: mpsc::Receiver<Bytes>,
        mut commands: mpsc::Receiver<SessionCommand<A::Render>>,
    ) -> Result<()> {
        let period = self
            .predictor
            .as_ref()
            .map(|p| p.interval())
            .unwrap_or_else(|| Duration::from_millis(self.ctx.config().predictor.min_interval_ms))
            .max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        while self.ctx.is_active() {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(raw) => {
                        if let Err(e) = self.handle_frame(raw).await {
                            debug!(error = %e, "Frame handling stopped the session");
                        }
                    }
                    None => {
                        debug!("Frame stream closed");
                        break;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(SessionCommand::Stop) => break,
                    Some(command) => self.apply(command).await?,
                    None => commands_open = false,
                },
                _ = ticker.tick(), if self.predicting => {
                    if let Err(e) = self.tick().await {
                        debug!(error = %e, "Predictor tick failed");
                    }
                }
            }
        }
        Ok(())
    }

    async fn apply(&mut self, command: SessionCommand<A::Render>) -> Result<()> {
        match command {
            SessionCommand::Query { key, callback } => {
                if let Err(e) = self.register_query(key, callback).await {
                    warn!(error = %e, "Query pull failed");
                }
            }
            SessionCommand::Input(input) => self.observe(input),
            SessionCommand::Layout(layout) => self.on_layout(layout),
            SessionCommand::AppState(state) => self.on_app_state(state),
            SessionCommand::Stop => {}
        }
        Ok(())
    }

    /// Log outstanding requests, flush telemetry and tear the session down
    pub async fn end(&mut self) -> Option<Summary> {
        let outstanding = self.engine.end();
        let now = self.ctx.now();
        let telemetry = self.ctx.telemetry().clone();

        if let Some(doc) = telemetry.write_events(now) {
            if self.ctx.is_active() {
                let posted = post(self.control.as_ref(), &self.ctx, Endpoint::LogWrite, doc).await;
                if let Err(e) = posted {
                    warn!(error = %e, "Telemetry upload failed");
                }
            }
        }
        if self.ctx.config().log_trace && self.ctx.is_active() {
            if let Some(doc) = telemetry.trace_document(&self.ctx.config().name, now) {
                let posted = post(self.control.as_ref(), &self.ctx, Endpoint::LogTrace, doc).await;
                if let Err(e) = posted {
                    warn!(error = %e, "Trace upload failed");
                }
            }
        }

        self.predicting = false;
        self.ctx.end();
        let summary = telemetry.summary();
        info!(outstanding, ?summary, "Session closed");
        summary
    }
}

/// Post to the control channel; a failure deactivates the session
async fn post(
    control: &dyn ControlChannel,
    ctx: &SessionContext,
    endpoint: Endpoint,
    body: Value,
) -> Result<Option<Value>> {
    match control.post(endpoint, body).await {
        Ok(reply) => Ok(reply),
        Err(e) => {
            warn!(endpoint = endpoint.path(), error = %e, "Control post failed");
            ctx.deactivate(endpoint.path());
            Err(e.into())
        }
    }
}

impl<A: App> std::fmt::Debug for Session<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine)
            .field("predicting", &self.predicting)
            .field("active", &self.ctx.is_active())
            .finish()
    }
}
