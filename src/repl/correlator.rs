//! Request/response correlation.
//!
//! Maps a numeric request id to the `oneshot` sender of the caller waiting
//! for its tagged reply. Every operation is a single critical section on one
//! `std::sync::Mutex`, never held across an `.await`, so for any id exactly
//! one of [`Correlator::resolve`] and [`Correlator::cancel`] takes effect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::{AppError, Result};

type PendingMap = HashMap<u32, oneshot::Sender<String>>;

#[derive(Debug)]
struct Inner {
    pending: Mutex<PendingMap>,
    next_id: AtomicU32,
}

/// Shared table of in-flight correlated calls.
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone)]
pub struct Correlator {
    inner: Arc<Inner>,
}

impl Correlator {
    /// Create an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU32::new(1),
            }),
        }
    }

    /// Register a fresh id that is not currently pending.
    ///
    /// Ids come from a wrapping counter; ids still outstanding are skipped.
    #[must_use]
    pub fn allocate(&self) -> PendingReply {
        let mut pending = self.lock();
        let (id, rx) = loop {
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            if !pending.contains_key(&id) {
                let (tx, rx) = oneshot::channel();
                pending.insert(id, tx);
                break (id, rx);
            }
        };
        drop(pending);

        PendingReply {
            id,
            rx,
            correlator: self.clone(),
        }
    }

    /// Register a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if `id` is already pending.
    pub fn register(&self, id: u32) -> Result<PendingReply> {
        let mut pending = self.lock();
        if pending.contains_key(&id) {
            return Err(AppError::Protocol(format!("request id {id} is already pending")));
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        drop(pending);

        Ok(PendingReply {
            id,
            rx,
            correlator: self.clone(),
        })
    }

    /// Remove `id` and deliver `value` to its waiter.
    ///
    /// Returns `false` when `id` is not pending (already timed out, never
    /// registered) or its waiter has gone away.
    pub fn resolve(&self, id: u32, value: String) -> bool {
        // The value is in the channel before the entry is observably gone.
        let mut pending = self.lock();
        let Some(tx) = pending.remove(&id) else {
            return false;
        };
        tx.send(value).is_ok()
    }

    /// Remove `id` without delivering a value.
    ///
    /// Returns `false` when `id` was already resolved or cancelled.
    pub fn cancel(&self, id: u32) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Drop every pending entry; their waiters observe a closed session.
    ///
    /// Returns the number of entries removed.
    pub fn cancel_all(&self) -> usize {
        let mut pending = self.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    /// Whether `id` is waiting for a reply.
    #[must_use]
    pub fn is_pending(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of outstanding correlated calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller side of one registered id.
///
/// Dropping it before resolution removes the id from the table.
#[derive(Debug)]
pub struct PendingReply {
    id: u32,
    rx: oneshot::Receiver<String>,
    correlator: Correlator,
}

impl PendingReply {
    /// The registered request id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Wait for the tagged reply, at most `deadline` when one is given.
    ///
    /// When the deadline fires the entry is cancelled. If the reader loop
    /// won that race the delivered value is returned instead of a timeout.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when no reply arrived before `deadline`.
    /// - [`AppError::Transport`] when the session was closed while waiting.
    pub async fn wait(mut self, deadline: Option<Duration>) -> Result<String> {
        let id = self.id;
        let Some(limit) = deadline else {
            return (&mut self.rx).await.map_err(|_| session_closed(id));
        };

        match tokio::time::timeout(limit, &mut self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(session_closed(id)),
            Err(_elapsed) => {
                if self.correlator.cancel(id) {
                    debug!(id, timeout = ?limit, "correlated call timed out");
                    return Err(AppError::Timeout(format!(
                        "no reply for request {id} within {}ms",
                        limit.as_millis()
                    )));
                }
                // Resolved between the deadline firing and the cancel; the
                // value is already in the channel.
                (&mut self.rx).await.map_err(|_| session_closed(id))
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        // Closing first makes our sender report `is_closed`, so an entry
        // registered later under the same id is never touched.
        self.rx.close();
        let mut pending = self.correlator.lock();
        if pending.get(&self.id).is_some_and(oneshot::Sender::is_closed) {
            pending.remove(&self.id);
        }
    }
}

fn session_closed(id: u32) -> AppError {
    AppError::Transport(format!("session closed while request {id} was pending"))
}
