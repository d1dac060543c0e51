//! Client session state machine.
//!
//! A session walks INIT, QUERY, RESPONSE and END in order. Any failure moves
//! it straight to END, which always runs: it says goodbye to the server,
//! closes the connection and, for full runs, hands the results to the
//! validator.

use crate::accumulator::{ResultAccumulator, ResultDocument};
use crate::batch::BatchBuilder;
use crate::config::DatasetSource;
use crate::error::ClientError;
use crate::handoff::ValidationHandoff;
use crate::shutdown::Shutdown;
use crate::source::RecordSource;
use crate::transport::Transport;
use filmq_protocol::{
    Dataset, Message, MessageType, ProtocolError, QuerySelection, ValidationVerdict,
};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Query,
    Response,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Query => "query",
            Phase::Response => "response",
            Phase::End => "end",
        };
        f.write_str(name)
    }
}

/// Resolved parameters of one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub client_id: String,
    pub query: QuerySelection,
    pub max_records: usize,
    pub max_bytes: usize,
    pub validator_addr: Option<String>,
    pub connect_timeout: Duration,
}

/// The error that sent a session to END early.
#[derive(Debug)]
pub struct SessionFailure {
    pub phase: Phase,
    pub error: ClientError,
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// Client id in effect at the end (server-issued when the ACK carried one).
    pub client_id: String,
    /// Every expected query received its end marker.
    pub completed: bool,
    /// The session stopped because shutdown was requested.
    pub cancelled: bool,
    pub failure: Option<SessionFailure>,
    /// Complete query results.
    pub document: ResultDocument,
    /// Verdict of the validator, if a handoff took place and got one.
    pub validation: Option<ValidationVerdict>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.completed && !self.cancelled && self.failure.is_none()
    }
}

/// A client session over one server connection.
pub struct Session<S = TcpStream> {
    transport: Transport<S>,
    settings: SessionSettings,
    client_id: String,
    phase: Phase,
    sources: Vec<DatasetSource>,
    builder: BatchBuilder,
    accumulator: ResultAccumulator,
    shutdown: Shutdown,
    failure: Option<SessionFailure>,
    cancelled: bool,
    collecting: bool,
}

impl Session<TcpStream> {
    /// Connects to the server and prepares a session.
    pub async fn connect(
        server_addr: &str,
        settings: SessionSettings,
        sources: Vec<DatasetSource>,
        shutdown: Shutdown,
    ) -> Result<Self, ClientError> {
        let transport = Transport::connect(server_addr, settings.connect_timeout).await?;
        Ok(Self::new(transport, settings, sources, shutdown))
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session over an established transport. Datasets are uploaded
    /// in the order given.
    pub fn new(
        transport: Transport<S>,
        settings: SessionSettings,
        sources: Vec<DatasetSource>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            transport,
            client_id: settings.client_id.clone(),
            builder: BatchBuilder::new(settings.max_records, settings.max_bytes),
            accumulator: ResultAccumulator::new(settings.query),
            settings,
            phase: Phase::Init,
            sources,
            shutdown,
            failure: None,
            cancelled: false,
            collecting: false,
        }
    }

    /// Drives the session to END and reports the outcome.
    pub async fn run(mut self) -> SessionReport {
        tracing::info!(
            "Session {} started with {} ({})",
            self.client_id,
            self.transport.peer(),
            self.settings.query
        );

        loop {
            if self.phase != Phase::End && self.shutdown.is_triggered() {
                tracing::warn!("Shutdown requested during {} phase", self.phase);
                self.cancelled = true;
                self.enter(Phase::End);
            }

            let next = match self.phase {
                Phase::Init => match self.initialize().await {
                    Ok(()) => Phase::Query,
                    Err(e) => self.fail(e),
                },
                Phase::Query => match self.upload().await {
                    Ok(()) => Phase::Response,
                    Err(e) => self.fail(e),
                },
                Phase::Response => match self.collect().await {
                    Ok(()) => Phase::End,
                    Err(e) => self.fail(e),
                },
                Phase::End => break,
            };
            self.enter(next);
        }

        self.finish().await
    }

    fn enter(&mut self, next: Phase) {
        if self.phase != next {
            tracing::debug!("Session phase {} -> {}", self.phase, next);
            self.phase = next;
        }
    }

    fn fail(&mut self, error: ClientError) -> Phase {
        tracing::error!("Session failed in {} phase: {}", self.phase, error);
        if self.failure.is_none() {
            self.failure = Some(SessionFailure {
                phase: self.phase,
                error,
            });
        }
        Phase::End
    }

    async fn initialize(&mut self) -> Result<(), ClientError> {
        self.transport.send_message(&Message::init()).await?;

        let reply = self.transport.receive_message().await?;
        match reply.kind {
            MessageType::Ack => {
                let issued = reply.payload_str()?.trim();
                if !issued.is_empty() && issued != self.client_id {
                    tracing::info!("Server assigned client id {}", issued);
                    self.client_id = issued.to_string();
                }
                Ok(())
            }
            MessageType::Error => Err(ClientError::Server(
                String::from_utf8_lossy(&reply.payload).into_owned(),
            )),
            other => Err(ClientError::UnexpectedMessage {
                phase: Phase::Init,
                got: other,
            }),
        }
    }

    async fn upload(&mut self) -> Result<(), ClientError> {
        self.transport
            .send_message(&Message::query(self.settings.query))
            .await?;

        let sources = std::mem::take(&mut self.sources);
        for (dataset, mut source) in sources {
            if !self.upload_dataset(dataset, source.as_mut()).await? {
                return Ok(());
            }
        }

        self.transport
            .send_message(&Message::finish_send_files())
            .await?;
        tracing::info!("All datasets sent");
        Ok(())
    }

    /// Streams one dataset followed by its EOF. Returns `false` when
    /// interrupted by shutdown.
    async fn upload_dataset(
        &mut self,
        dataset: Dataset,
        source: &mut (dyn RecordSource + Send),
    ) -> Result<bool, ClientError> {
        let mut batches = 0usize;
        let mut records = 0usize;

        loop {
            if self.shutdown.is_triggered() {
                tracing::warn!(
                    "Upload of {} interrupted after {} batches",
                    dataset,
                    batches
                );
                return Ok(false);
            }

            let batch = self.builder.build(source)?;
            if !batch.is_empty() {
                self.transport
                    .send_message(&Message::batch(dataset, batch.payload))
                    .await?;
                batches += 1;
                records += batch.records;
            }
            if batch.is_final {
                break;
            }
        }

        self.transport.send_message(&Message::eof(dataset)).await?;
        tracing::info!(
            "Sent {} records of {} in {} batches",
            records,
            dataset,
            batches
        );
        Ok(true)
    }

    async fn collect(&mut self) -> Result<(), ClientError> {
        self.collecting = true;

        while !self.accumulator.is_complete() {
            if self.shutdown.is_triggered() {
                tracing::warn!(
                    "Shutdown requested while waiting for results ({:?} pending)",
                    self.accumulator.pending()
                );
                self.cancelled = true;
                return Ok(());
            }

            let frame = match self.transport.receive_frame().await {
                Ok(frame) => frame,
                Err(e) if e.is_transport() => {
                    tracing::error!(
                        "Connection lost while waiting for results ({:?} pending): {}",
                        self.accumulator.pending(),
                        e
                    );
                    self.failure = Some(SessionFailure {
                        phase: Phase::Response,
                        error: e,
                    });
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let message = match Message::try_from(frame) {
                Ok(message) => message,
                Err(ProtocolError::UnknownMessageType(tag)) => {
                    tracing::warn!("Skipping message with unknown type tag {}", tag);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match message.kind {
                MessageType::QueryResult(query) | MessageType::QueryEof(query)
                    if !self.accumulator.is_expected(query) =>
                {
                    tracing::warn!("Ignoring {} for a query that was not requested", message.kind);
                }
                MessageType::QueryResult(query) => {
                    let fragment = message.payload_str()?;
                    if !self.accumulator.append(query, fragment) {
                        tracing::warn!("Dropping {} fragment received after its end", query);
                    }
                }
                MessageType::QueryEof(query) => {
                    if self.accumulator.mark_complete(query) {
                        tracing::info!(
                            "Received {} ({} fragments)",
                            query,
                            self.accumulator.fragments(query)
                        );
                    } else {
                        tracing::warn!("Ignoring duplicate end of {}", query);
                    }
                }
                MessageType::Error => {
                    return Err(ClientError::Server(
                        String::from_utf8_lossy(&message.payload).into_owned(),
                    ));
                }
                other => {
                    tracing::warn!("Ignoring {} message during response phase", other);
                }
            }
        }

        tracing::info!("All query results received");
        Ok(())
    }

    async fn finish(mut self) -> SessionReport {
        if let Err(e) = self
            .transport
            .send_message(&Message::finish_communication())
            .await
        {
            tracing::warn!("Could not send FINISH_COMMUNICATION: {}", e);
        }
        self.transport.close().await;

        let document = self.accumulator.finalize();
        let validation = match &self.settings.validator_addr {
            Some(addr) if self.settings.query.is_all() && self.collecting && !self.cancelled => {
                ValidationHandoff::new(addr.clone(), self.settings.connect_timeout)
                    .run(&self.client_id, &document)
                    .await
            }
            _ => None,
        };

        let completed = self.accumulator.is_complete();
        tracing::info!(
            "Session {} finished (completed: {}, cancelled: {})",
            self.client_id,
            completed,
            self.cancelled
        );

        SessionReport {
            client_id: self.client_id,
            completed,
            cancelled: self.cancelled,
            failure: self.failure,
            document,
            validation,
        }
    }
}
