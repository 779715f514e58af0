//! Reference app adapter reconstructing artifacts from a contiguous prefix

use bytes::{Buf, BufMut, Bytes, BytesMut};
use khameleon_core::{App, Construct, FragmentSet};
use serde_json::{json, Value};
use tracing::debug;

/// Bytes preceding the content of every block
pub const BLOCK_HEADER_LEN: usize = 12;

/// Artifacts split into ordered blocks, usable up to the first gap.
///
/// Each payload is `u32 block_id | u64 content_len | content`
/// (little-endian). The rendered artifact is the concatenated content of
/// blocks `0..n` where `n` is the length of the contiguous prefix held.
#[derive(Debug, Clone)]
pub struct PrefixApp {
    state: Value,
    server: Option<Value>,
}

impl Default for PrefixApp {
    fn default() -> Self {
        Self::new(json!({}))
    }
}

impl PrefixApp {
    /// Adapter reporting `state` at initialization
    pub fn new(state: Value) -> Self {
        Self {
            state,
            server: None,
        }
    }

    /// Payload the server answered initialization with
    pub fn server_state(&self) -> Option<&Value> {
        self.server.as_ref()
    }

    /// Frame one block
    pub fn encode_block(block_id: u32, content: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(BLOCK_HEADER_LEN + content.len());
        buf.put_u32_le(block_id);
        buf.put_u64_le(content.len() as u64);
        buf.put_slice(content);
        buf.freeze()
    }

    /// Content of one block; `None` if the payload is malformed
    pub fn decode_block(payload: &Bytes) -> Option<(u32, Bytes)> {
        let mut buf = payload.clone();
        if buf.remaining() < BLOCK_HEADER_LEN {
            return None;
        }
        let block_id = buf.get_u32_le();
        let len = usize::try_from(buf.get_u64_le()).ok()?;
        if buf.remaining() < len {
            return None;
        }
        Some((block_id, buf.split_to(len)))
    }
}

impl App for PrefixApp {
    type Render = Bytes;

    fn get_state(&self) -> Value {
        self.state.clone()
    }

    fn on_open(&mut self, payload: &Value) {
        self.server = Some(payload.clone());
    }

    fn construct(&mut self, key: &str, blocks: &FragmentSet, _nblocks: u32) -> Construct<Bytes> {
        let mut out = BytesMut::new();
        let mut inblocks = 0u32;
        while let Some(fragment) = blocks.get(&inblocks) {
            match Self::decode_block(&fragment.data) {
                Some((_, content)) => out.extend_from_slice(&content),
                None => {
                    debug!(key, block = inblocks, "Malformed block ends prefix");
                    break;
                }
            }
            inblocks += 1;
        }
        Construct {
            render: out.freeze(),
            inblocks,
        }
    }
}
