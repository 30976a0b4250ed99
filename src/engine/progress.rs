//! Progress channel.
//!
//! A bounded multi-producer, single-consumer queue of encoded wire lines.
//! The allocator and each deposit task hold a cloned `ProgressChannel`; the
//! HTTP response drains the `ProgressStream`. Lines from one producer keep
//! their order; lines from concurrent producers may interleave.

use std::convert::Infallible;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;

use crate::types::AllocatorError;
use crate::wire::{self, TerminalResult};

/// Default queue depth before producers wait on the consumer.
pub const DEFAULT_CAPACITY: usize = 64;

/// Sending half.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: mpsc::Sender<String>,
}

/// Receiving half.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<String>,
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> (Self, ProgressStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ProgressStream { rx })
    }

    async fn send(&self, line: String) -> Result<(), AllocatorError> {
        self.tx
            .send(line)
            .await
            .map_err(|_| AllocatorError::StreamClosed)
    }

    /// Emit a human-readable status line.
    pub async fn log(&self, message: impl AsRef<str>) -> Result<(), AllocatorError> {
        self.send(wire::encode_log(message.as_ref())).await
    }

    /// Emit an `Error: …` line.
    pub async fn error(&self, err: &AllocatorError) -> Result<(), AllocatorError> {
        self.send(wire::encode_error(&err.to_string())).await
    }

    /// Emit the terminal result line.
    pub async fn result(&self, result: &TerminalResult) -> Result<(), AllocatorError> {
        let line = wire::encode_result(result)
            .map_err(|e| AllocatorError::InvalidAmount(format!("unserializable result: {e}")))?;
        self.send(line).await
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ProgressStream {
    /// Next encoded line, or `None` once every sender is dropped.
    pub async fn next_line(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Drain everything until all senders are dropped.
    pub async fn collect_text(mut self) -> String {
        let mut out = String::new();
        while let Some(line) = self.rx.recv().await {
            out.push_str(&line);
        }
        out
    }

    /// Adapt into a byte-chunk stream for an HTTP body.
    pub fn into_stream(self) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
        stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|line| (Ok(line), rx))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
