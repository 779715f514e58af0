//! # Khameleon Core
//!
//! Shared vocabulary for the Khameleon predictive prefetch client.
//!
//! Khameleon delivers large artifacts progressively over a push transport:
//! the server streams numbered fragments for the queries it believes the user
//! will ask next, and the client reconstructs partial results as soon as any
//! usable prefix has arrived.
//!
//! This crate holds the pieces every other crate agrees on:
//!
//! - **Data model**: [`Header`], [`Fragment`], [`FragmentSet`], [`CacheData`],
//!   [`TracePoint`], [`Layout`]
//! - **Session**: [`SessionConfig`] and the explicit [`SessionContext`] that
//!   replaces process-wide globals (active flag, clock, telemetry)
//! - **Collaborators**: the [`App`] adapter and the [`ControlChannel`]
//! - **Telemetry**: the [`TelemetrySink`] contract and the in-memory
//!   [`SystemLogger`] recorder
//!
//! ## Example
//!
//! ```ignore
//! use khameleon_core::{SessionConfig, SessionContext};
//!
//! let config = SessionConfig::from_file("session.json")?;
//! let ctx = SessionContext::new(config).into_shared();
//! assert!(!ctx.is_active());
//! ```

mod app;
mod clock;
mod config;
mod context;
mod control;
mod error;
mod telemetry;
mod types;

pub use app::{App, Construct};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, CachePolicy, DistModel, PredictorConfig, SessionConfig, TraceConfig,
};
pub use context::SessionContext;
pub use control::{ControlChannel, Endpoint, RecordingChannel};
pub use error::{CoreError, Result};
pub use telemetry::{
    EventType, NullTelemetry, OnBlockRecord, OverPushRecord, QueryRecord, ResponseRecord,
    Summary, SystemLogger, TelemetryEvent, TelemetrySink,
};
pub use types::{Action, Bounds, CacheData, Fragment, FragmentSet, Header, Layout, TracePoint};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        App, CacheData, Clock, Construct, ControlChannel, Endpoint, Fragment, FragmentSet,
        Header, Layout, Result, SessionConfig, SessionContext, TelemetrySink, TracePoint,
    };
}
