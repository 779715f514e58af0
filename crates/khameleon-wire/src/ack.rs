//! Client acknowledgements

use crate::{Result, WireError};
use std::fmt;
use std::str::FromStr;

/// Acknowledgement of a received frame, sent as `"<frameIndex> <millis>"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub frame_index: u32,
    pub timestamp_ms: u64,
}

impl Ack {
    /// Ack for a frame, or `None` for the initial frame
    pub fn for_frame(frame_index: u32, timestamp_ms: u64) -> Option<Self> {
        (frame_index != 0).then_some(Self {
            frame_index,
            timestamp_ms,
        })
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.frame_index, self.timestamp_ms)
    }
}

impl FromStr for Ack {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || WireError::MalformedAck(s.to_string());
        let mut parts = s.split_whitespace();
        let frame_index = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let timestamp_ms = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(Self {
            frame_index,
            timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_frame_not_acked() {
        assert!(Ack::for_frame(0, 100).is_none());
        assert_eq!(
            Ack::for_frame(3, 100),
            Some(Ack {
                frame_index: 3,
                timestamp_ms: 100
            })
        );
    }

    #[test]
    fn test_format_and_parse() {
        let ack = Ack::for_frame(12, 1_700_000_000_123).unwrap();
        let text = ack.to_string();
        assert_eq!(text, "12 1700000000123");
        assert_eq!(text.parse::<Ack>().unwrap(), ack);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("12".parse::<Ack>().is_err());
        assert!("a b".parse::<Ack>().is_err());
        assert!("1 2 3".parse::<Ack>().is_err());
    }
}
