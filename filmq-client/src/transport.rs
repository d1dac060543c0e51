//! Reliable framed transport over a byte stream.

use crate::error::{ClientError, TransportError};
use bytes::{Bytes, BytesMut};
use filmq_protocol::{Frame, FrameStep, Message, LENGTH_PREFIX_SIZE};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// A framed connection to a peer.
///
/// Sends and receives always transfer the exact number of bytes requested or
/// fail; there is no partial result and no reconnect.
pub struct Transport<S = TcpStream> {
    stream: Option<S>,
    peer: String,
}

impl Transport<TcpStream> {
    /// Connects to `addr` over TCP.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Connect {
                addr: addr.to_string(),
                source: TransportError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection timed out",
                )),
            })?
            .map_err(|e| ClientError::Connect {
                addr: addr.to_string(),
                source: TransportError::Io(e),
            })?;

        stream.set_nodelay(true).ok();
        tracing::debug!("Connected to {}", addr);

        Ok(Self::new(stream, addr))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already established stream.
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            peer: peer.into(),
        }
    }

    /// Address or name of the remote peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Writes all of `data`.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(data).await.map_err(map_io_error)?;
        stream.flush().await.map_err(map_io_error)?;
        Ok(())
    }

    /// Reads exactly `n` bytes.
    pub async fn receive(&mut self, n: usize) -> Result<Bytes, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = BytesMut::zeroed(n);
        stream.read_exact(&mut buf).await.map_err(map_io_error)?;
        Ok(buf.freeze())
    }

    /// Sends a message: length prefix first, then the tag and payload.
    pub async fn send_message(&mut self, message: &Message) -> Result<(), ClientError> {
        let frame = message.to_frame();
        let prefix = frame.encode_length()?;
        let body = frame.encode_body();

        self.send(&prefix)
            .await
            .map_err(|source| ClientError::Transport {
                step: FrameStep::WriteLength,
                source,
            })?;
        self.send(&body)
            .await
            .map_err(|source| ClientError::Transport {
                step: FrameStep::WriteBody,
                source,
            })?;

        tracing::trace!(
            "Sent {} to {} ({} payload bytes)",
            message.kind,
            self.peer,
            message.payload.len()
        );
        Ok(())
    }

    /// Receives one raw frame.
    pub async fn receive_frame(&mut self) -> Result<Frame, ClientError> {
        let prefix = self
            .receive(LENGTH_PREFIX_SIZE)
            .await
            .map_err(|source| ClientError::Transport {
                step: FrameStep::ReadLength,
                source,
            })?;
        let body_len = Frame::decode_length([prefix[0], prefix[1], prefix[2], prefix[3]])?;

        let body = self
            .receive(body_len)
            .await
            .map_err(|source| ClientError::Transport {
                step: FrameStep::ReadBody,
                source,
            })?;

        Ok(Frame::decode_body(body)?)
    }

    /// Receives one message, rejecting unknown type tags.
    pub async fn receive_message(&mut self) -> Result<Message, ClientError> {
        let frame = self.receive_frame().await?;
        Ok(Message::try_from(frame)?)
    }

    /// Closes the connection. Closing an already closed transport is a no-op.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Shutdown of connection to {} failed: {}", self.peer, e);
            }
            tracing::debug!("Connection to {} closed", self.peer);
        }
    }
}

fn map_io_error(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => TransportError::Closed,
        _ => TransportError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filmq_protocol::{Dataset, MessageType, ProtocolError, QueryId};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_receive_frame_across_partial_reads() {
        let mock = Builder::new()
            .read(&[0, 0])
            .read(&[0, 4, 9])
            .read(b"a")
            .read(b"bc")
            .build();
        let mut transport = Transport::new(mock, "mock");

        let message = transport.receive_message().await.unwrap();
        assert_eq!(message.kind, MessageType::QueryResult(QueryId::Q1));
        assert_eq!(message.payload.as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_send_message_writes_prefix_then_body() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 4])
            .write(&[3, b'a', b'|', b'b'])
            .build();
        let mut transport = Transport::new(mock, "mock");

        transport
            .send_message(&Message::batch(Dataset::Movies, &b"a|b"[..]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_reports_step() {
        let mock = Builder::new()
            .write(&[0, 0, 0, 1])
            .write_error(io::Error::from(io::ErrorKind::BrokenPipe))
            .build();
        let mut transport = Transport::new(mock, "mock");

        let err = transport.send_message(&Message::init()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport {
                step: FrameStep::WriteBody,
                source: TransportError::Io(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_read_failure_reports_step() {
        let mock = Builder::new()
            .read(&[0, 0, 0])
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let mut transport = Transport::new(mock, "mock");

        let err = transport.receive_frame().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport {
                step: FrameStep::ReadLength,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_protocol_error() {
        let mock = Builder::new().read(&[0, 0, 0, 0]).build();
        let mut transport = Transport::new(mock, "mock");

        let err = transport.receive_frame().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::EmptyFrame)
        ));
    }

    #[tokio::test]
    async fn test_unknown_tag_surfaces_from_receive_message() {
        let mock = Builder::new().read(&[0, 0, 0, 2, 99, b'x']).build();
        let mut transport = Transport::new(mock, "mock");

        let err = transport.receive_message().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::UnknownMessageType(99))
        ));
    }

    #[tokio::test]
    async fn test_peer_close_mid_body() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, "duplex");

        server.write_all(&[0, 0, 0, 10, 9, b'x']).await.unwrap();
        drop(server);

        let err = transport.receive_frame().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport {
                step: FrameStep::ReadBody,
                source: TransportError::Closed
            }
        ));
    }

    #[tokio::test]
    async fn test_messages_cross_a_duplex_pair() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = Transport::new(client, "server");
        let mut server = Transport::new(server, "client");

        client.send_message(&Message::init()).await.unwrap();
        client.send_message(&Message::eof(Dataset::Credits)).await.unwrap();

        let first = server.receive_message().await.unwrap();
        assert_eq!(first.kind, MessageType::Init);
        assert!(first.payload.is_empty());

        let second = server.receive_message().await.unwrap();
        assert_eq!(second.kind, MessageType::Eof(Dataset::Credits));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, "duplex");

        assert!(transport.is_open());
        transport.close().await;
        assert!(!transport.is_open());
        transport.close().await;

        let err = transport.send(b"late").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }
}
