//! Motor-pair slot bookkeeping.
//!
//! The hub can bind at most [`PAIR_SLOT_COUNT`] port combinations into
//! motor pairs at once. [`PairSlotTable`] mirrors that limit on the host so
//! the session can hand out slot indices without asking the hub. The table
//! is pure state; the remote `motor_pair.pair` / `motor_pair.unpair`
//! statements are issued by
//! [`ReplSession`](crate::repl::session::ReplSession).
//!
//! # Slot lifecycle
//!
//! ```text
//! (absent) --reserve--> Pairing --confirm--> Paired --release--> Released
//!              ^            |                                      |
//!              |        rollback -> (absent)                       |
//!              +------------ evicted by the next reserve ----------+
//! ```

use crate::models::port::HubPort;
use crate::{AppError, Result};

/// Number of motor pairs the hub supports at the same time.
pub const PAIR_SLOT_COUNT: u8 = 3;

/// A slot index bound to a left/right port combination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PairSlot {
    /// Hub-side pair index in `0..PAIR_SLOT_COUNT`.
    pub index: u8,
    /// Left motor port.
    pub left: HubPort,
    /// Right motor port.
    pub right: HubPort,
}

impl PairSlot {
    /// Remote statement that binds this slot to its ports.
    #[must_use]
    pub fn pair_statement(&self) -> String {
        format!(
            "motor_pair.pair({}, {}, {})",
            self.index,
            self.left.number(),
            self.right.number()
        )
    }

    /// Remote statement that clears this slot on the hub.
    #[must_use]
    pub fn unpair_statement(&self) -> String {
        format!("motor_pair.unpair({})", self.index)
    }
}

/// Occupancy state of a slot entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// Pair statements are being sent; the index is occupied.
    Pairing,
    /// The hub confirmed the pairing write.
    Paired,
    /// Unpaired; kept for diagnostics until the next reservation evicts it.
    Released,
}

/// Outcome of [`PairSlotTable::reserve`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// The combination already owns this slot; nothing must be sent.
    Existing(PairSlot),
    /// The slot is reserved and the caller must issue the pair statements,
    /// then [`confirm`](PairSlotTable::confirm) or
    /// [`rollback`](PairSlotTable::rollback).
    NeedsPairing(PairSlot),
}

impl Reservation {
    /// The slot this reservation refers to.
    #[must_use]
    pub fn slot(&self) -> PairSlot {
        match self {
            Self::Existing(slot) | Self::NeedsPairing(slot) => *slot,
        }
    }
}

#[derive(Debug, Clone)]
struct SlotEntry {
    slot: PairSlot,
    status: SlotStatus,
}

/// Host-side table of motor-pair slots.
#[derive(Debug, Default)]
pub struct PairSlotTable {
    entries: Vec<SlotEntry>,
}

impl PairSlotTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for `(left, right)`.
    ///
    /// A combination that already owns a slot keeps its index: a paired or
    /// in-flight slot is returned as [`Reservation::Existing`], a released
    /// one is moved back to [`SlotStatus::Pairing`] for re-pairing. For a new
    /// combination every released entry is evicted first, then the lowest
    /// free index is taken.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CapacityExceeded` when every slot is occupied.
    pub fn reserve(&mut self, left: HubPort, right: HubPort) -> Result<Reservation> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.slot.left == left && e.slot.right == right)
        {
            return Ok(match entry.status {
                SlotStatus::Pairing | SlotStatus::Paired => Reservation::Existing(entry.slot),
                SlotStatus::Released => {
                    entry.status = SlotStatus::Pairing;
                    Reservation::NeedsPairing(entry.slot)
                }
            });
        }

        self.entries.retain(|e| e.status != SlotStatus::Released);

        let Some(index) =
            (0..PAIR_SLOT_COUNT).find(|i| !self.entries.iter().any(|e| e.slot.index == *i))
        else {
            return Err(AppError::CapacityExceeded(format!(
                "only {PAIR_SLOT_COUNT} motor pairs are supported at the same time"
            )));
        };

        let slot = PairSlot { index, left, right };
        self.entries.push(SlotEntry {
            slot,
            status: SlotStatus::Pairing,
        });
        Ok(Reservation::NeedsPairing(slot))
    }

    /// Mark a reserved slot as paired. Returns `false` if the slot is gone.
    pub fn confirm(&mut self, slot: PairSlot) -> bool {
        match self.entry_mut(slot) {
            Some(entry) => {
                entry.status = SlotStatus::Paired;
                true
            }
            None => false,
        }
    }

    /// Drop a slot whose pairing failed so its index becomes free again.
    pub fn rollback(&mut self, slot: PairSlot) {
        self.entries
            .retain(|e| !(e.slot == slot && e.status == SlotStatus::Pairing));
    }

    /// Mark a slot as released without evicting it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the slot is not in the table.
    pub fn release(&mut self, slot: PairSlot) -> Result<()> {
        let entry = self.entry_mut(slot).ok_or_else(|| {
            AppError::NotFound(format!(
                "no motor pair slot {} bound to ({}, {})",
                slot.index, slot.left, slot.right
            ))
        })?;
        entry.status = SlotStatus::Released;
        Ok(())
    }

    /// Current status of `slot`, if present.
    #[must_use]
    pub fn status(&self, slot: PairSlot) -> Option<SlotStatus> {
        self.entries
            .iter()
            .find(|e| e.slot == slot)
            .map(|e| e.status)
    }

    /// Snapshot of every entry ordered by slot index.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(PairSlot, SlotStatus)> {
        let mut out: Vec<_> = self.entries.iter().map(|e| (e.slot, e.status)).collect();
        out.sort_by_key(|(slot, _)| slot.index);
        out
    }

    fn entry_mut(&mut self, slot: PairSlot) -> Option<&mut SlotEntry> {
        self.entries.iter_mut().find(|e| e.slot == slot)
    }
}
