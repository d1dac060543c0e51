//! # filmq-client
//!
//! Client library for filmq.
//!
//! This crate provides:
//! - A reliable framed transport over TCP
//! - Record sources and size-bounded batch construction
//! - The session state machine (INIT, QUERY, RESPONSE, END)
//! - Result accumulation and typed rendering per query
//! - The validation handoff to a separate results validator

pub mod accumulator;
pub mod batch;
pub mod config;
pub mod error;
pub mod handoff;
pub mod report;
pub mod session;
pub mod shutdown;
pub mod source;
pub mod transport;

pub use accumulator::{ResultAccumulator, ResultDocument};
pub use batch::{Batch, BatchBuilder};
pub use config::{BatchConfig, ClientConfig, ConfigError, DatasetConfig, DatasetSource};
pub use error::{ClientError, SourceError, TransportError};
pub use handoff::ValidationHandoff;
pub use report::{render_document, QueryReport, ReportValue};
pub use session::{Phase, Session, SessionFailure, SessionReport, SessionSettings};
pub use shutdown::Shutdown;
pub use source::{CsvRecordReader, RecordSource};
pub use transport::Transport;
