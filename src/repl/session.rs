//! Public REPL session.
//!
//! [`ReplSession`] owns the channel, the reader task, the [`Correlator`],
//! and the motor-pair slot table. It is the only thing external code talks
//! to: command builders format remote statements and hand them to
//! [`ReplSession::send_code`] or [`ReplSession::send_code_and_wait_result`].
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//! ```
//!
//! Sending is only valid while `Connected`. A disconnected session can be
//! connected again as long as its [`Connector`] can open a new channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ReplConfig;
use crate::control::{control_name, INTERRUPT};
use crate::models::pair::{PairSlot, PairSlotTable, Reservation, SlotStatus};
use crate::models::port::HubPort;
use crate::repl::correlator::Correlator;
use crate::repl::reader::run_reader;
use crate::repl::tag::tagged_statement;
use crate::transport::serial::SerialConnector;
use crate::transport::writer::LineWriter;
use crate::transport::Connector;
use crate::{AppError, Result};

/// Lines buffered for each output subscriber before it starts lagging.
pub const OUTPUT_BUFFER: usize = 256;

/// Connection lifecycle state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No channel is open.
    Disconnected,
    /// The channel is being opened.
    Connecting,
    /// Statements can be sent.
    Connected,
    /// The reader is stopping and the channel is being closed.
    Disconnecting,
}

/// Live resources of one connection.
struct Connection {
    writer: Arc<LineWriter>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

struct Lifecycle {
    state: SessionState,
    connection: Option<Connection>,
}

/// Async command/response client for the hub REPL.
///
/// All methods take `&self`; share the session behind an `Arc` to use it
/// from several tasks at once.
///
/// # Correlated calls
///
/// [`send_code_and_wait_result`](Self::send_code_and_wait_result) wraps the
/// expression so the hub prints `ID<id>:<value>`, and the reader task hands
/// that line's payload to the waiting caller. Calls complete in the order
/// their replies arrive, not the order they were issued.
///
/// # Motor pairs
///
/// The hub supports three motor pairs at a time.
/// [`acquire_pair_slot`](Self::acquire_pair_slot) hands out slot indices
/// and issues the `motor_pair` statements;
/// [`release_pair_slot`](Self::release_pair_slot) frees them.
///
/// # Cancellation
///
/// Dropping a `connect` future while the channel is opening, or a
/// `disconnect` future at any point, leaves the session `Disconnected`.
/// Dropping a correlated call unregisters its id.
///
/// # Examples
///
/// ```rust,ignore
/// use spike_repl::{ReplConfig, ReplSession};
///
/// let session = ReplSession::serial(ReplConfig::for_port("/dev/ttyACM0"));
/// session.connect().await?;
/// let value = session.send_code_and_wait_result("1 + 1", None).await?;
/// assert_eq!(value, "2");
/// session.disconnect().await?;
/// ```
pub struct ReplSession {
    connector: Arc<dyn Connector>,
    config: ReplConfig,
    correlator: Correlator,
    output: broadcast::Sender<String>,
    lifecycle: Mutex<Lifecycle>,
    pairs: Mutex<PairSlotTable>,
}

impl ReplSession {
    /// Create a disconnected session over `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: ReplConfig) -> Self {
        let (output, _) = broadcast::channel(OUTPUT_BUFFER);
        Self {
            connector,
            config,
            correlator: Correlator::new(),
            output,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Disconnected,
                connection: None,
            }),
            pairs: Mutex::new(PairSlotTable::new()),
        }
    }

    /// Create a disconnected session on the serial device named in `config`.
    #[must_use]
    pub fn serial(config: ReplConfig) -> Self {
        let connector = Arc::new(SerialConnector::new(config.port_name.clone()));
        Self::new(connector, config)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &ReplConfig {
        &self.config
    }

    /// Number of correlated calls waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Subscribe to every line the hub prints, tagged replies included.
    #[must_use]
    pub fn subscribe_output(&self) -> broadcast::Receiver<String> {
        self.output.subscribe()
    }

    /// Open the channel, start the reader, interrupt any running program,
    /// and send the configured prelude.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidState`] unless the session is `Disconnected`.
    /// - [`AppError::Transport`] if the channel cannot be opened or the
    ///   interrupt/prelude cannot be written; the session is left
    ///   `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let span = info_span!("repl_connect", channel = %self.connector.describe());
        async {
            self.begin_connect()?;
            let opening = TransitionGuard::new(&self.lifecycle, SessionState::Connecting);

            let connection = match self.open_connection().await {
                Ok(connection) => connection,
                Err(err) => {
                    warn!(%err, "failed to open channel");
                    return Err(err);
                }
            };

            opening.connected(connection);

            if let Err(err) = self.send_setup().await {
                warn!(%err, "setup failed, closing channel");
                self.disconnect().await?;
                return Err(err);
            }

            info!("repl session connected");
            Ok::<(), AppError>(())
        }
        .instrument(span)
        .await
    }

    /// Stop the reader, close the channel, and fail every pending call.
    ///
    /// Idempotent: disconnecting a disconnected session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidState`] while a connect is in progress.
    pub async fn disconnect(&self) -> Result<()> {
        let connection = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                SessionState::Disconnected | SessionState::Disconnecting => return Ok(()),
                SessionState::Connecting => {
                    return Err(AppError::InvalidState(
                        "cannot disconnect while connecting".into(),
                    ))
                }
                SessionState::Connected => {
                    lifecycle.state = SessionState::Disconnecting;
                    lifecycle.connection.take()
                }
            }
        };

        let _closing = TransitionGuard::new(&self.lifecycle, SessionState::Disconnecting);
        let failed = self.correlator.cancel_all();

        if let Some(connection) = connection {
            connection.cancel.cancel();
            if let Err(err) = connection.reader.await {
                warn!(%err, "repl reader task did not stop cleanly");
            }
            connection.writer.close().await;
        }

        info!(failed, "repl session disconnected");
        Ok(())
    }

    /// Write each statement in order without waiting for any output.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidState`] unless the session is `Connected`.
    /// - [`AppError::Transport`] if a write fails or times out; statements
    ///   after the failing one are not sent.
    pub async fn send_code<S>(&self, statements: &[S]) -> Result<()>
    where
        S: AsRef<str> + Sync,
    {
        let writer = self.connected_writer()?;
        for statement in statements {
            let text = statement.as_ref();
            match control_name(text) {
                Some(name) => debug!(statement = name, "send"),
                None => debug!(statement = %text, "send"),
            }
            writer.write_statement(text).await?;
        }
        Ok(())
    }

    /// Evaluate `expr` on the hub and return the first line it prints.
    ///
    /// Waits at most `timeout`, or the configured default when `None`.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidState`] unless the session is `Connected`.
    /// - [`AppError::Transport`] if the write fails or the session closes
    ///   while waiting.
    /// - [`AppError::Timeout`] if no tagged reply arrives in time.
    pub async fn send_code_and_wait_result(
        &self,
        expr: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let writer = self.connected_writer()?;
        let reply = self.correlator.allocate();
        let statement = tagged_statement(reply.id(), expr);

        debug!(id = reply.id(), statement = %statement, "send");
        // On failure `reply` is dropped, which unregisters the id.
        writer.write_statement(&statement).await?;

        reply.wait(timeout.or_else(|| self.config.wait_timeout())).await
    }

    /// Bind `left` and `right` into a motor pair and return its slot.
    ///
    /// Re-acquiring a combination that already owns a slot returns that
    /// slot; nothing is sent unless the slot had been released.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidState`] unless the session is `Connected`.
    /// - [`AppError::CapacityExceeded`] when every slot is paired.
    /// - [`AppError::Transport`] if the pairing statements cannot be sent;
    ///   the reservation is rolled back.
    pub async fn acquire_pair_slot(&self, left: HubPort, right: HubPort) -> Result<PairSlot> {
        self.connected_writer()?;

        let reservation = self.pairs().reserve(left, right)?;
        let slot = match reservation {
            Reservation::Existing(slot) => {
                debug!(slot = slot.index, %left, %right, "motor pair already bound");
                return Ok(slot);
            }
            Reservation::NeedsPairing(slot) => slot,
        };

        // Unpair first to clear whatever the hub still holds for this index.
        let outcome = self
            .send_code(&[slot.unpair_statement(), slot.pair_statement()])
            .await;

        match outcome {
            Ok(()) => {
                self.pairs().confirm(slot);
                info!(slot = slot.index, %left, %right, "motor pair bound");
                Ok(slot)
            }
            Err(err) => {
                self.pairs().rollback(slot);
                warn!(slot = slot.index, %left, %right, %err, "motor pairing failed");
                Err(err)
            }
        }
    }

    /// Unpair `slot` on the hub and mark it released.
    ///
    /// The entry stays visible in [`pair_slots`](Self::pair_slots) until the
    /// next acquisition of a different combination evicts it. Releasing an
    /// already released slot is a no-op.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if `slot` is not in the table.
    /// - [`AppError::InvalidState`] / [`AppError::Transport`] as for
    ///   [`send_code`](Self::send_code).
    pub async fn release_pair_slot(&self, slot: PairSlot) -> Result<()> {
        let status = self.pairs().status(slot).ok_or_else(|| {
            AppError::NotFound(format!("motor pair slot {} is not bound", slot.index))
        })?;
        if status == SlotStatus::Released {
            return Ok(());
        }

        self.send_code(&[slot.unpair_statement()]).await?;
        self.pairs().release(slot)?;
        info!(slot = slot.index, "motor pair released");
        Ok(())
    }

    /// Snapshot of the slot table ordered by index.
    #[must_use]
    pub fn pair_slots(&self) -> Vec<(PairSlot, SlotStatus)> {
        self.pairs().snapshot()
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn begin_connect(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != SessionState::Disconnected {
            return Err(AppError::InvalidState(format!(
                "connect requires Disconnected, session is {:?}",
                lifecycle.state
            )));
        }
        lifecycle.state = SessionState::Connecting;
        Ok(())
    }

    async fn open_connection(&self) -> Result<Connection> {
        let channel = self.connector.open().await?;

        let writer = Arc::new(LineWriter::new(channel.writer, self.config.send_timeout()));
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(
            run_reader(
                channel.reader,
                self.correlator.clone(),
                self.output.clone(),
                cancel.clone(),
            )
            .instrument(info_span!("repl_reader")),
        );

        Ok(Connection {
            writer,
            cancel,
            reader,
        })
    }

    async fn send_setup(&self) -> Result<()> {
        self.send_code(&[INTERRUPT]).await?;
        self.send_code(&self.config.prelude).await
    }

    fn connected_writer(&self) -> Result<Arc<LineWriter>> {
        let lifecycle = self.lifecycle();
        match (&lifecycle.state, &lifecycle.connection) {
            (SessionState::Connected, Some(connection)) => Ok(Arc::clone(&connection.writer)),
            (state, _) => Err(AppError::InvalidState(format!(
                "session is {state:?}, expected Connected"
            ))),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock_lifecycle(&self.lifecycle)
    }

    fn pairs(&self) -> MutexGuard<'_, PairSlotTable> {
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Moves a transitional lifecycle state to `Disconnected` when dropped.
///
/// Covers the error paths and a caller dropping the `connect`/`disconnect`
/// future mid-way. [`connected`](Self::connected) disarms it.
struct TransitionGuard<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    during: SessionState,
    armed: bool,
}

impl<'a> TransitionGuard<'a> {
    fn new(lifecycle: &'a Mutex<Lifecycle>, during: SessionState) -> Self {
        Self {
            lifecycle,
            during,
            armed: true,
        }
    }

    /// Install `connection` and move to `Connected`.
    fn connected(mut self, connection: Connection) {
        let mut lifecycle = lock_lifecycle(self.lifecycle);
        lifecycle.connection = Some(connection);
        lifecycle.state = SessionState::Connected;
        self.armed = false;
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut lifecycle = lock_lifecycle(self.lifecycle);
        if lifecycle.state == self.during {
            lifecycle.state = SessionState::Disconnected;
            debug!(from = ?self.during, "session back to Disconnected");
        }
    }
}

fn lock_lifecycle(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Drop for ReplSession {
    fn drop(&mut self) {
        if let Some(connection) = self.lifecycle().connection.take() {
            connection.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ReplSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplSession")
            .field("channel", &self.connector.describe())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// Verify Send + Sync at compile time.
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn check() {
        assert_send_sync::<ReplSession>();
    }
    let _ = check;
};
