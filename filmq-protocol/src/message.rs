//! Message types exchanged with the aggregation server and the validator.

use crate::error::ProtocolError;
use crate::frame::Frame;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Datasets uploaded to the server, in upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    Movies,
    Ratings,
    Credits,
}

impl Dataset {
    /// All datasets in the fixed order they are uploaded.
    pub const ALL: [Dataset; 3] = [Dataset::Movies, Dataset::Ratings, Dataset::Credits];

    /// Lowercase dataset name.
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Movies => "movies",
            Dataset::Ratings => "ratings",
            Dataset::Credits => "credits",
        }
    }

    fn index(&self) -> u8 {
        match self {
            Dataset::Movies => 0,
            Dataset::Ratings => 1,
            Dataset::Credits => 2,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Analytical queries the server can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryId {
    Q1,
    Q2,
    Q3,
    Q4,
    Q5,
}

impl QueryId {
    pub const ALL: [QueryId; 5] = [
        QueryId::Q1,
        QueryId::Q2,
        QueryId::Q3,
        QueryId::Q4,
        QueryId::Q5,
    ];

    /// 1-based query number.
    pub fn number(&self) -> u8 {
        match self {
            QueryId::Q1 => 1,
            QueryId::Q2 => 2,
            QueryId::Q3 => 3,
            QueryId::Q4 => 4,
            QueryId::Q5 => 5,
        }
    }

    pub fn from_number(n: u8) -> Result<Self, ProtocolError> {
        match n {
            1 => Ok(QueryId::Q1),
            2 => Ok(QueryId::Q2),
            3 => Ok(QueryId::Q3),
            4 => Ok(QueryId::Q4),
            5 => Ok(QueryId::Q5),
            other => Err(ProtocolError::InvalidQuery(other)),
        }
    }

    /// Key used for this query in result documents ("query_1" .. "query_5").
    pub fn key(&self) -> String {
        format!("query_{}", self.number())
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {}", self.number())
    }
}

/// Queries requested in the QUERY phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuerySelection {
    /// Every query; encoded as `0` on the wire.
    #[default]
    All,
    Single(QueryId),
}

impl QuerySelection {
    /// Wire representation of the selection.
    pub fn to_byte(&self) -> u8 {
        match self {
            QuerySelection::All => 0,
            QuerySelection::Single(query) => query.number(),
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            0 => Ok(QuerySelection::All),
            n => QueryId::from_number(n).map(QuerySelection::Single),
        }
    }

    /// Queries whose results the server will stream back.
    pub fn queries(&self) -> Vec<QueryId> {
        match self {
            QuerySelection::All => QueryId::ALL.to_vec(),
            QuerySelection::Single(query) => vec![*query],
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, QuerySelection::All)
    }
}

impl fmt::Display for QuerySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySelection::All => write!(f, "all queries"),
            QuerySelection::Single(query) => write!(f, "{}", query),
        }
    }
}

/// Every message type known to both peers.
///
/// Tag values are part of the protocol contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Query,
    /// Server acknowledgment of INIT.
    Ack,
    FinishCommunication,
    Batch(Dataset),
    Eof(Dataset),
    QueryResult(QueryId),
    QueryEof(QueryId),
    FinishSendFiles,
    Init,
    Error,
    ClientResults,
    ResultsValidation,
}

impl MessageType {
    const BATCH_BASE: u8 = 3;
    const EOF_BASE: u8 = 6;
    const RESULT_BASE: u8 = 9;

    /// One-byte wire tag.
    pub fn tag(&self) -> u8 {
        match self {
            MessageType::Query => 0,
            MessageType::Ack => 1,
            MessageType::FinishCommunication => 2,
            MessageType::Batch(dataset) => Self::BATCH_BASE + dataset.index(),
            MessageType::Eof(dataset) => Self::EOF_BASE + dataset.index(),
            MessageType::QueryResult(query) => Self::RESULT_BASE + 2 * (query.number() - 1),
            MessageType::QueryEof(query) => Self::RESULT_BASE + 2 * (query.number() - 1) + 1,
            MessageType::FinishSendFiles => 19,
            MessageType::Init => 20,
            MessageType::Error => 21,
            MessageType::ClientResults => 22,
            MessageType::ResultsValidation => 23,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        let kind = match tag {
            0 => MessageType::Query,
            1 => MessageType::Ack,
            2 => MessageType::FinishCommunication,
            3..=5 => MessageType::Batch(Dataset::ALL[(tag - Self::BATCH_BASE) as usize]),
            6..=8 => MessageType::Eof(Dataset::ALL[(tag - Self::EOF_BASE) as usize]),
            9..=18 => {
                let offset = tag - Self::RESULT_BASE;
                let query = QueryId::ALL[(offset / 2) as usize];
                if offset % 2 == 0 {
                    MessageType::QueryResult(query)
                } else {
                    MessageType::QueryEof(query)
                }
            }
            19 => MessageType::FinishSendFiles,
            20 => MessageType::Init,
            21 => MessageType::Error,
            22 => MessageType::ClientResults,
            23 => MessageType::ResultsValidation,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Query => write!(f, "QUERY"),
            MessageType::Ack => write!(f, "ACK"),
            MessageType::FinishCommunication => write!(f, "FINISH_COMMUNICATION"),
            MessageType::Batch(dataset) => {
                write!(f, "BATCH_{}", dataset.name().to_uppercase())
            }
            MessageType::Eof(dataset) => write!(f, "EOF_{}", dataset.name().to_uppercase()),
            MessageType::QueryResult(query) => write!(f, "RESULT_QUERY_{}", query.number()),
            MessageType::QueryEof(query) => write!(f, "EOF_QUERY_{}", query.number()),
            MessageType::FinishSendFiles => write!(f, "FINISH_SEND_FILES"),
            MessageType::Init => write!(f, "INIT"),
            MessageType::Error => write!(f, "ERROR"),
            MessageType::ClientResults => write!(f, "CLIENT_RESULTS"),
            MessageType::ResultsValidation => write!(f, "RESULTS_VALIDATION"),
        }
    }
}

/// A typed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    fn empty(kind: MessageType) -> Self {
        Self::new(kind, Bytes::new())
    }

    pub fn init() -> Self {
        Self::empty(MessageType::Init)
    }

    /// Init acknowledgment, optionally carrying a server-issued client id.
    pub fn ack(client_id: Option<&str>) -> Self {
        let payload = client_id
            .map(|id| Bytes::copy_from_slice(id.as_bytes()))
            .unwrap_or_default();
        Self::new(MessageType::Ack, payload)
    }

    pub fn query(selection: QuerySelection) -> Self {
        Self::new(MessageType::Query, vec![selection.to_byte()])
    }

    pub fn batch(dataset: Dataset, records: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Batch(dataset), records)
    }

    pub fn eof(dataset: Dataset) -> Self {
        Self::empty(MessageType::Eof(dataset))
    }

    pub fn finish_send_files() -> Self {
        Self::empty(MessageType::FinishSendFiles)
    }

    pub fn finish_communication() -> Self {
        Self::empty(MessageType::FinishCommunication)
    }

    pub fn query_result(query: QueryId, fragment: impl Into<String>) -> Self {
        Self::new(MessageType::QueryResult(query), fragment.into())
    }

    pub fn query_eof(query: QueryId) -> Self {
        Self::empty(MessageType::QueryEof(query))
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(MessageType::Error, reason.into())
    }

    pub fn client_results(results: &ClientResults) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(results)?;
        Ok(Self::new(MessageType::ClientResults, payload))
    }

    pub fn results_validation(verdict: &ValidationVerdict) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(verdict)?;
        Ok(Self::new(MessageType::ResultsValidation, payload))
    }

    /// Payload interpreted as UTF-8 text.
    pub fn payload_str(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Payload deserialized from JSON.
    pub fn payload_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(self.kind.tag(), self.payload.clone())
    }
}

impl TryFrom<Frame> for Message {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self, ProtocolError> {
        let kind = MessageType::try_from(frame.tag)?;
        Ok(Self {
            kind,
            payload: frame.payload,
        })
    }
}

/// CLIENT_RESULTS payload sent to the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResults {
    pub client_id: String,
    /// Rendered results keyed by "query_N".
    pub results: BTreeMap<String, Value>,
}

/// RESULTS_VALIDATION payload returned by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Whether every query matched the expected results.
    pub result: bool,
}
