//! Delivery of the finalized result document to the results validator.

use crate::accumulator::ResultDocument;
use crate::error::ClientError;
use crate::report::render_document;
use crate::transport::Transport;
use filmq_protocol::{ClientResults, Message, MessageType, ValidationVerdict};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// One-shot exchange with the validator: send results, read the verdict, say goodbye.
///
/// Failures are logged and never retried.
#[derive(Debug, Clone)]
pub struct ValidationHandoff {
    addr: String,
    connect_timeout: Duration,
}

impl ValidationHandoff {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    /// Runs the handoff. Returns the validator's verdict when one was received.
    pub async fn run(&self, client_id: &str, document: &ResultDocument) -> Option<ValidationVerdict> {
        tracing::info!(
            "Handing off {} query results to validator at {}",
            document.len(),
            self.addr
        );

        match self.try_run(client_id, document).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!("Validation handoff to {} failed: {}", self.addr, e);
                None
            }
        }
    }

    async fn try_run(
        &self,
        client_id: &str,
        document: &ResultDocument,
    ) -> Result<Option<ValidationVerdict>, ClientError> {
        let mut transport = Transport::connect(&self.addr, self.connect_timeout).await?;
        let result = exchange(&mut transport, client_id, document).await;
        transport.close().await;
        result
    }
}

/// Performs the validator exchange over an open transport.
pub async fn exchange<S>(
    transport: &mut Transport<S>,
    client_id: &str,
    document: &ResultDocument,
) -> Result<Option<ValidationVerdict>, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let results = ClientResults {
        client_id: client_id.to_string(),
        results: render_document(document)?,
    };
    transport
        .send_message(&Message::client_results(&results)?)
        .await?;

    let reply = transport.receive_message().await?;
    let verdict = match reply.kind {
        MessageType::ResultsValidation => {
            let verdict: ValidationVerdict = reply.payload_json()?;
            if verdict.result {
                tracing::info!("Validator accepted results of client {}", client_id);
            } else {
                tracing::warn!("Validator rejected results of client {}", client_id);
            }
            Some(verdict)
        }
        MessageType::Error => {
            tracing::error!(
                "Validator reported an error: {}",
                String::from_utf8_lossy(&reply.payload)
            );
            None
        }
        other => {
            tracing::warn!("Unexpected {} reply from validator", other);
            None
        }
    };

    transport
        .send_message(&Message::finish_communication())
        .await?;
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn document() -> ResultDocument {
        let mut document = ResultDocument::new();
        document.insert("query_2".to_string(), "\"Argentina\",\"1000.5\"".to_string());
        document.insert("query_4".to_string(), "\"Ricardo Darín\",\"17\"".to_string());
        document
    }

    #[tokio::test]
    async fn test_exchange_accepted() {
        let (client, server) = tokio::io::duplex(4096);

        let validator = tokio::spawn(async move {
            let mut peer = Transport::new(server, "client");
            let msg = peer.receive_message().await.unwrap();
            assert_eq!(msg.kind, MessageType::ClientResults);

            let results: ClientResults = msg.payload_json().unwrap();
            peer.send_message(&Message::results_validation(&ValidationVerdict { result: true }).unwrap())
                .await
                .unwrap();

            let finish = peer.receive_message().await.unwrap();
            assert_eq!(finish.kind, MessageType::FinishCommunication);
            results
        });

        let mut transport = Transport::new(client, "validator");
        let verdict = exchange(&mut transport, "client-9", &document())
            .await
            .unwrap();
        assert_eq!(verdict, Some(ValidationVerdict { result: true }));

        let results = validator.await.unwrap();
        assert_eq!(results.client_id, "client-9");
        assert_eq!(results.results["query_2"], serde_json::json!({"Argentina": 1000.5}));
        assert_eq!(results.results["query_4"], serde_json::json!({"Ricardo Darín": 17}));
    }

    #[tokio::test]
    async fn test_exchange_error_reply() {
        let (client, server) = tokio::io::duplex(4096);

        let validator = tokio::spawn(async move {
            let mut peer = Transport::new(server, "client");
            peer.receive_message().await.unwrap();
            peer.send_message(&Message::error("malformed results"))
                .await
                .unwrap();
            peer.receive_message().await.unwrap().kind
        });

        let mut transport = Transport::new(client, "validator");
        let verdict = exchange(&mut transport, "c", &ResultDocument::new())
            .await
            .unwrap();
        assert!(verdict.is_none());
        assert_eq!(validator.await.unwrap(), MessageType::FinishCommunication);
    }

    #[tokio::test]
    async fn test_exchange_peer_closed() {
        let (client, server) = tokio::io::duplex(4096);

        let validator = tokio::spawn(async move {
            let mut peer = Transport::new(server, "client");
            peer.receive_message().await.unwrap();
            peer.close().await;
        });

        let mut transport = Transport::new(client, "validator");
        let err = exchange(&mut transport, "c", &document())
            .await
            .unwrap_err();
        assert!(err.is_transport());
        validator.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let validator = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut peer = Transport::new(socket, "client");
            let msg = peer.receive_message().await.unwrap();
            let results: ClientResults = msg.payload_json().unwrap();
            let verdict = ValidationVerdict {
                result: results.results.len() == 2,
            };
            peer.send_message(&Message::results_validation(&verdict).unwrap())
                .await
                .unwrap();
            peer.receive_message().await.unwrap();
        });

        let handoff = ValidationHandoff::new(addr, Duration::from_secs(5));
        let verdict = handoff.run("client-1", &document()).await;
        assert_eq!(verdict, Some(ValidationVerdict { result: true }));
        validator.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let handoff = ValidationHandoff::new(addr, Duration::from_secs(1));
        assert!(handoff.run("client-1", &document()).await.is_none());
    }
}
