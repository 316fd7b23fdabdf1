//! Line-framed transports for the tool protocol.
//!
//! One JSON message per line. Framing is the transport's whole job: raw
//! lines go up to the server (which owns parse-error responses), and typed
//! responses come back down.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::mpsc;

use crate::protocol::JsonRpcResponse;

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O failed.
    #[error("transport IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A response could not be serialized.
    #[error("transport JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The peer side of a buffer transport went away.
    #[error("transport channel closed")]
    ChannelClosed,
}

/// A framed duplex channel carrying the tool protocol.
#[async_trait]
pub trait Transport: Send {
    /// Receive the next raw message, or `None` at end of stream.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Send one response.
    async fn send(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError>;
}

/// Stdio transport: newline-delimited JSON on stdin/stdout.
///
/// Stdout belongs to this transport exclusively; logging goes to stderr.
pub struct StdioTransport {
    reader: BufReader<Stdin>,
    writer: Stdout,
}

impl StdioTransport {
    /// Attach to the process's stdin/stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line).await?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn send(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        let mut payload = serde_json::to_vec(response)?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Channel-backed transport for in-process tests.
pub struct BufferTransport {
    input: mpsc::Receiver<String>,
    output: mpsc::Sender<JsonRpcResponse>,
}

impl BufferTransport {
    /// Build a transport plus its test-side handles: a sender for raw
    /// request lines and a receiver for responses.
    #[must_use]
    pub fn new() -> (Self, mpsc::Sender<String>, mpsc::Receiver<JsonRpcResponse>) {
        let (line_tx, line_rx) = mpsc::channel(32);
        let (response_tx, response_rx) = mpsc::channel(32);
        (
            Self {
                input: line_rx,
                output: response_tx,
            },
            line_tx,
            response_rx,
        )
    }
}

#[async_trait]
impl Transport for BufferTransport {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.input.recv().await)
    }

    async fn send(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        self.output
            .send(response.clone())
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}
