//! # Khameleon Wire
//!
//! Binary framing for fragments pushed from server to client, plus the text
//! acknowledgement the client returns.
//!
//! ## Frame Layout (little-endian)
//!
//! ```text
//! ┌────────────┬────────────┬──────────────┬──────────┬─────────────┬─────────┐
//! │ frame idx  │ block id   │ total blocks │ key len  │ key (UTF-8) │ payload │
//! │    u32     │    u32     │     u32      │   u64    │  key len B  │  rest   │
//! └────────────┴────────────┴──────────────┴──────────┴─────────────┴─────────┘
//! ```
//!
//! Every frame except index 0 is acknowledged with `"<frameIndex> <millis>"`.

mod ack;
mod codec;
mod error;
mod log;

pub use ack::Ack;
pub use codec::{decode_frame, encode_frame, Frame, FIXED_HEADER_LEN};
pub use error::{Result, WireError};
pub use log::{read_frame_log, write_frame_log};

/// Prelude for common imports
pub mod prelude {
    pub use super::{decode_frame, encode_frame, Ack, Frame, Result, WireError};
}
