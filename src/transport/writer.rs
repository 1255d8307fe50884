//! Serialized statement writer.
//!
//! Every statement is written while holding one async mutex, so a
//! multi-line block is never interleaved with another caller's output.
//! Multi-line text is framed as:
//!
//! ```text
//! CTRL-A\r\n
//! <text>\r\n
//! CTRL-B\r\n
//! ```
//!
//! which the hub's REPL treats as one multi-statement unit.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use crate::control::{CTRL_A, CTRL_B};
use crate::transport::codec::ReplCodec;
use crate::transport::BoxedWriter;
use crate::{AppError, Result};

/// Shared, mutually-exclusive writer over the channel's write half.
///
/// Wrapped in an `Arc` and shared by every sender of a session.
///
/// # Framing
///
/// Single-line statements go out as `text\r\n`. Text containing `\n` is
/// sent as a CTRL-A line, the text, and a CTRL-B line, all under one lock
/// acquisition and flushed together.
///
/// # Timeouts
///
/// With a write timeout set, each statement (framing included) must be
/// flushed within it or [`write_statement`](Self::write_statement) fails
/// with [`AppError::Transport`]. Bytes already handed to the sink stay
/// buffered and go out with the next write.
///
/// # Shutdown
///
/// [`close`](Self::close) flushes and shuts the write half down; writes
/// after it fail with `"writer closed"`.
pub struct LineWriter {
    sink: Mutex<Option<FramedWrite<BoxedWriter, ReplCodec>>>,
    write_timeout: Option<Duration>,
}

impl LineWriter {
    /// Wrap `writer`; each statement write is bounded by `write_timeout`.
    #[must_use]
    pub fn new(writer: BoxedWriter, write_timeout: Option<Duration>) -> Self {
        Self {
            sink: Mutex::new(Some(FramedWrite::new(writer, ReplCodec::new()))),
            write_timeout,
        }
    }

    /// Write one statement, framing it when it spans several lines.
    ///
    /// # Errors
    ///
    /// - [`AppError::Transport`]`("write timed out …")` when the write
    ///   exceeds the configured timeout.
    /// - [`AppError::Transport`]`("write failed: …")` on I/O failure.
    /// - [`AppError::Transport`]`("writer closed")` after [`close`](Self::close).
    pub async fn write_statement(&self, text: &str) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| AppError::Transport("writer closed".into()))?;

        let write = async {
            if text.contains('\n') {
                sink.feed(CTRL_A.to_owned()).await?;
                sink.feed(text.to_owned()).await?;
                sink.feed(CTRL_B.to_owned()).await?;
            } else {
                sink.feed(text.to_owned()).await?;
            }
            sink.flush().await
        };

        let outcome = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write).await.map_err(|_| {
                AppError::Transport(format!("write timed out after {}ms", limit.as_millis()))
            })?,
            None => write.await,
        };

        outcome.map_err(|err| {
            warn!(error = %err, "line writer: write failed");
            AppError::Transport(format!("write failed: {err}"))
        })
    }

    /// Flush and shut the write half down. Idempotent.
    pub async fn close(&self) {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return;
        };
        if let Err(err) = sink.close().await {
            debug!(error = %err, "line writer: close failed");
        }
    }
}

impl std::fmt::Debug for LineWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineWriter")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
