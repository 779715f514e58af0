//! Recorded frame logs: each frame prefixed by its u32 little-endian length

use crate::{Result, WireError};
use bytes::Bytes;
use std::io::{ErrorKind, Read, Write};

/// Read every frame from a length-prefixed log
pub fn read_frame_log<R: Read>(mut reader: R) -> Result<Vec<Bytes>> {
    let mut frames = Vec::new();
    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                WireError::truncated(len as u64, 0)
            } else {
                e.into()
            }
        })?;
        frames.push(Bytes::from(frame));
    }
    Ok(frames)
}

/// Write frames as a length-prefixed log
pub fn write_frame_log<W: Write>(mut writer: W, frames: &[Bytes]) -> Result<()> {
    for frame in frames {
        writer.write_all(&(frame.len() as u32).to_le_bytes())?;
        writer.write_all(frame)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_frame, encode_frame};
    use khameleon_core::Header;

    #[test]
    fn test_log_preserves_frames() {
        let frames = vec![
            encode_frame(0, &Header::new("a", 0, 2), b"first"),
            encode_frame(1, &Header::new("a", 1, 2), b"second"),
        ];
        let mut buf = Vec::new();
        write_frame_log(&mut buf, &frames).unwrap();

        let back = read_frame_log(&buf[..]).unwrap();
        assert_eq!(back, frames);
        assert_eq!(decode_frame(back[1].clone()).unwrap().header.block_id, 1);
    }

    #[test]
    fn test_truncated_log_entry() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(b"abc");
        assert!(matches!(
            read_frame_log(&buf[..]),
            Err(WireError::Truncated { needed: 10, .. })
        ));
    }
}
