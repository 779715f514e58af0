//! Frame encode/decode

use crate::{Result, WireError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use khameleon_core::Header;
use tracing::debug;

/// Bytes before the key: frame index, block id, block count, key length
pub const FIXED_HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// One decoded push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Per-push sequence number
    pub frame_index: u32,
    /// Fragment header
    pub header: Header,
    /// Fragment payload (shares the input buffer)
    pub payload: Bytes,
}

impl Frame {
    /// Whether the client must acknowledge this frame
    pub fn needs_ack(&self) -> bool {
        self.frame_index != 0
    }
}

/// Decode one frame.
///
/// Only bounds are checked; a declared key length past the end of the buffer
/// makes the frame unusable. Invalid UTF-8 in the key is replaced with U+FFFD.
pub fn decode_frame(mut buf: Bytes) -> Result<Frame> {
    if buf.len() < FIXED_HEADER_LEN {
        debug!(len = buf.len(), "Frame shorter than fixed header");
        return Err(WireError::truncated(FIXED_HEADER_LEN as u64, buf.len()));
    }

    let frame_index = buf.get_u32_le();
    let block_id = buf.get_u32_le();
    let nblocks = buf.get_u32_le();
    let key_len = buf.get_u64_le();

    if key_len > buf.remaining() as u64 {
        debug!(frame_index, key_len, remaining = buf.remaining(), "Key runs past frame end");
        return Err(WireError::truncated(
            (FIXED_HEADER_LEN as u64).saturating_add(key_len),
            FIXED_HEADER_LEN + buf.remaining(),
        ));
    }

    let key_bytes = buf.split_to(key_len as usize);
    let key = String::from_utf8_lossy(&key_bytes).into_owned();

    Ok(Frame {
        frame_index,
        header: Header {
            key,
            block_id,
            nblocks,
        },
        payload: buf,
    })
}

/// Encode one frame
pub fn encode_frame(frame_index: u32, header: &Header, payload: &[u8]) -> Bytes {
    let key = header.key.as_bytes();
    let mut buf = BytesMut::with_capacity(FIXED_HEADER_LEN + key.len() + payload.len());
    buf.put_u32_le(frame_index);
    buf.put_u32_le(header.block_id);
    buf.put_u32_le(header.nblocks);
    buf.put_u64_le(key.len() as u64);
    buf.put_slice(key);
    buf.put_slice(payload);
    buf.freeze()
}
