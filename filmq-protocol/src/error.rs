//! Protocol error types.

use std::fmt;
use thiserror::Error;

/// Errors raised while encoding or decoding frames and payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u32 },

    #[error("malformed frame: zero-length body")]
    EmptyFrame,

    #[error("unknown message type tag: {0}")]
    UnknownMessageType(u8),

    #[error("invalid query identifier: {0}")]
    InvalidQuery(u8),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The step of a frame transfer at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// Writing the 4-byte length prefix.
    WriteLength,
    /// Writing the tag and payload.
    WriteBody,
    /// Reading the 4-byte length prefix.
    ReadLength,
    /// Reading the tag and payload.
    ReadBody,
}

impl fmt::Display for FrameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStep::WriteLength => write!(f, "write frame length"),
            FrameStep::WriteBody => write!(f, "write frame body"),
            FrameStep::ReadLength => write!(f, "read frame length"),
            FrameStep::ReadBody => write!(f, "read frame body"),
        }
    }
}
