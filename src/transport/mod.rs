//! Physical channel to the hub.
//!
//! A [`Connector`] opens a [`Channel`]: an async byte reader and writer
//! pair. The session frames the reader with [`codec::ReplCodec`] for the
//! reader loop and wraps the writer in a [`writer::LineWriter`].
//!
//! - `codec`: CRLF line framing with bounded line length.
//! - `serial`: [`serial::SerialConnector`] for a USB/Bluetooth serial device.
//! - `writer`: serialized statement writes with multi-line framing.

pub mod codec;
pub mod serial;
pub mod writer;

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{AppError, Result};

/// Read half of an open channel.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an open channel.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open byte channel to the hub.
pub struct Channel {
    /// Bytes arriving from the hub.
    pub reader: BoxedReader,
    /// Bytes sent to the hub.
    pub writer: BoxedWriter,
}

impl Channel {
    /// Build a channel from any reader/writer pair.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens the physical channel for a session.
///
/// Called once per [`connect`](crate::repl::session::ReplSession::connect).
pub trait Connector: Send + Sync {
    /// Acquire the channel.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the channel cannot be acquired.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Channel>> + Send + '_>>;

    /// Human-readable channel name used in logs.
    fn describe(&self) -> String;
}

/// Connector over a pre-built stream pair, for TCP bridges and tests.
///
/// The channel can be handed out exactly once; a second `open` fails with
/// [`AppError::Transport`].
pub struct StreamConnector {
    name: String,
    channel: Mutex<Option<Channel>>,
}

impl StreamConnector {
    /// Wrap an already-open channel.
    #[must_use]
    pub fn new(name: impl Into<String>, channel: Channel) -> Self {
        Self {
            name: name.into(),
            channel: Mutex::new(Some(channel)),
        }
    }

    /// Wrap a single bidirectional stream such as a `TcpStream` or one end
    /// of [`tokio::io::duplex`].
    #[must_use]
    pub fn from_stream<S>(name: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(name, Channel::new(reader, writer))
    }
}

impl Connector for StreamConnector {
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Channel>> + Send + '_>> {
        Box::pin(async move {
            let taken = self
                .channel
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            taken.ok_or_else(|| {
                AppError::Transport(format!("stream '{}' was already consumed", self.name))
            })
        })
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
