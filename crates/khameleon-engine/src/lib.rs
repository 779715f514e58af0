//! # Khameleon Engine
//!
//! Turns pushed fragments into progressively better answers for the
//! queries a client has registered.
//!
//! ## Architecture
//!
//! ```text
//!  frames ──► decode ──► Engine::ingest ──► FragmentCache::write
//!                             │                     │
//!                             │              BlockEvent (mpsc)
//!                             ▼                     │
//!                      RequestManager ◄─── on_block ┘
//!                        │  prefix-cut preemption
//!                        ▼
//!                 App::construct ──► utility ──► callback (strictly increasing)
//!
//!  Session: tokio::select! { frames, commands, predictor tick }
//!           └─► ControlChannel (init, start, pull, post_dist, telemetry)
//! ```
//!
//! Requests are answered in sequence order. Once a newer query delivers a
//! better result, every strictly older outstanding query is preempted and
//! its callback never fires again. Each request's busy flag is cleared on
//! every exit from processing.

mod app;
mod engine;
mod error;
mod request;
mod session;

pub use app::{PrefixApp, BLOCK_HEADER_LEN};
pub use engine::{Engine, Outcome, Registration, REGISTER_SOURCE};
pub use error::{EngineError, Result};
pub use request::{Callback, Request, RequestManager, Response, INIT_SOURCE};
pub use session::{AckSink, Session, SessionCommand};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        AckSink, Callback, Engine, EngineError, Outcome, PrefixApp, Registration,
        RequestManager, Response, Result, Session, SessionCommand,
    };
}
