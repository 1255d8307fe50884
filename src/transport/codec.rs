//! CRLF line codec for the hub REPL stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a bounded line length.
//! The hub terminates lines with `\r\n`; decoding splits on `\n` and strips
//! the trailing `\r`, encoding always appends `\r\n`.
//!
//! A malformed line (over-long or not UTF-8) is logged and skipped inside
//! the decoder so one bad line never ends the [`FramedRead`] stream.
//!
//! [`FramedRead`]: tokio_util::codec::FramedRead

use std::io::ErrorKind;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum accepted inbound line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line terminator written after every outbound line.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Line codec for the hub REPL.
///
/// Delegates framing to [`LinesCodec`] with a [`MAX_LINE_BYTES`] limit.
/// Each `\n`-terminated UTF-8 string, minus an optional trailing `\r`, is
/// one line of hub output.
///
/// # Decoder
///
/// Over-long lines and lines that are not valid UTF-8 are logged at `WARN`
/// and dropped; decoding resumes with the next line. Other I/O errors are
/// mapped to [`AppError::Transport`]`("read failed: …")`.
///
/// # Encoder
///
/// Outbound strings are encoded as `item\r\n`. The length limit only
/// applies to decoding.
///
/// # Examples
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use spike_repl::transport::codec::ReplCodec;
///
/// let lines = FramedRead::new(channel.reader, ReplCodec::new());
/// ```
#[derive(Debug)]
pub struct ReplCodec(LinesCodec);

impl ReplCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom inbound line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for ReplCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ReplCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next complete line from `src`, without its terminator.
    ///
    /// Returns `Ok(None)` while no complete line is buffered.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode(src) {
                Ok(line) => return Ok(line),
                Err(err) => skip_malformed(err)?,
            }
        }
    }

    /// Decode the final unterminated line when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode_eof(src) {
                Ok(line) => return Ok(line),
                Err(err) => skip_malformed(err)?,
            }
        }
    }
}

impl Encoder<String> for ReplCodec {
    type Error = AppError;

    /// Encode `item` followed by `\r\n`.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + LINE_TERMINATOR.len());
        dst.put(item.as_bytes());
        dst.put(LINE_TERMINATOR.as_bytes());
        Ok(())
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Log and swallow per-line faults; surface real I/O failures.
///
/// `LinesCodec` has already consumed (or started discarding) the offending
/// bytes when it reports these errors, so decoding can simply resume.
fn skip_malformed(err: LinesCodecError) -> Result<()> {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            warn!("repl codec: line too long, discarding");
            Ok(())
        }
        LinesCodecError::Io(io_err) if io_err.kind() == ErrorKind::InvalidData => {
            warn!(error = %io_err, "repl codec: line is not valid utf-8, discarding");
            Ok(())
        }
        LinesCodecError::Io(io_err) => Err(AppError::Transport(format!("read failed: {io_err}"))),
    }
}
