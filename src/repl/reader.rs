//! REPL reader task.
//!
//! Reads CRLF lines from the hub, resolves correlated calls whose tagged
//! reply (`ID<id>:<payload>`) arrives, and publishes every line to output
//! subscribers. Lines without a tag are ordinary program output.
//!
//! A failing read is logged and the loop keeps going: one bad line must not
//! strand every other in-flight call. The task only ends when its
//! [`CancellationToken`] fires.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::repl::correlator::Correlator;
use crate::repl::tag::parse_tagged_line;
use crate::transport::codec::ReplCodec;

/// Pause after a read fault before polling the channel again.
pub const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Route one received line.
///
/// Returns the id of the call it resolved, if any.
pub fn handle_line(
    correlator: &Correlator,
    output: &broadcast::Sender<String>,
    line: String,
) -> Option<u32> {
    debug!(line = %line, "recv");

    let resolved = match parse_tagged_line(&line) {
        Some((id, payload)) if correlator.resolve(id, payload.to_owned()) => Some(id),
        Some((id, _)) => {
            debug!(id, "repl reader: tagged line has no pending request, dropping");
            None
        }
        None => None,
    };

    // No subscribers is the normal case.
    let _ = output.send(line);
    resolved
}

/// Reader task: drives `stream` until `cancel` fires.
///
/// When the hub closes the stream nothing more can arrive, so every pending
/// call is failed at once and the task idles until cancelled.
pub async fn run_reader<R>(
    stream: R,
    correlator: Correlator,
    output: broadcast::Sender<String>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, ReplCodec::new());
    // FramedRead yields one `None` after reporting an error, then resumes.
    let mut after_error = false;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("repl reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    Some(Ok(line)) => {
                        after_error = false;
                        handle_line(&correlator, &output, line);
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "repl reader: read failed, continuing");
                        after_error = true;
                        tokio::time::sleep(READ_ERROR_BACKOFF).await;
                    }

                    None if after_error => {
                        after_error = false;
                    }

                    None => {
                        let failed = correlator.cancel_all();
                        warn!(failed, "repl reader: stream closed by hub");
                        cancel.cancelled().await;
                        debug!("repl reader: cancellation received, stopping");
                        break;
                    }
                }
            }
        }
    }
}
