//! Client error types.

use crate::session::Phase;
use filmq_protocol::{FrameStep, MessageType, ProtocolError};
use thiserror::Error;

/// Connection-level failures of the byte stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,

    #[error("not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a record source other than clean end-of-data.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error reading records: {0}")]
    Io(#[from] std::io::Error),

    #[error("unterminated quoted field in record starting at line {line}")]
    UnterminatedQuote { line: usize },

    #[error("record of {size} bytes exceeds batch limit of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: TransportError,
    },

    #[error("{step} failed: {source}")]
    Transport {
        step: FrameStep,
        #[source]
        source: TransportError,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("record source error: {0}")]
    Source(#[from] SourceError),

    #[error("unexpected {got} message during {phase} phase")]
    UnexpectedMessage { phase: Phase, got: MessageType },

    #[error("server error: {0}")]
    Server(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Returns whether the error came from the underlying connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::Connect { .. }
        )
    }
}
