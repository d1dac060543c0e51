//! # filmq-protocol
//!
//! Wire protocol spoken between the filmq client, the aggregation server and
//! the results validator.
//!
//! This crate provides:
//! - Binary framing with a big-endian length prefix and a one-byte type tag
//! - The closed set of message types shared by encoder and decoder
//! - Dataset and query identifiers
//! - JSON payload schemas for the validation handoff

pub mod error;
pub mod frame;
pub mod message;

pub use error::{FrameStep, ProtocolError};
pub use frame::{Frame, LENGTH_PREFIX_SIZE, TAG_SIZE};
pub use message::{
    ClientResults, Dataset, Message, MessageType, QueryId, QuerySelection, ValidationVerdict,
};

/// Maximum frame body size (tag + payload), 16 MiB.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Separator byte placed between records inside a batch payload.
pub const RECORD_SEPARATOR: u8 = b'|';
