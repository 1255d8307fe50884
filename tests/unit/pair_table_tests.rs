//! Unit tests for motor-pair slot bookkeeping.

use spike_repl::models::pair::{PairSlot, PairSlotTable, Reservation, PAIR_SLOT_COUNT};
use spike_repl::{AppError, HubPort, SlotStatus};

fn reserve_and_confirm(table: &mut PairSlotTable, left: HubPort, right: HubPort) -> PairSlot {
    let reservation = table.reserve(left, right).expect("slot available");
    let Reservation::NeedsPairing(slot) = reservation else {
        panic!("expected a fresh reservation, got {reservation:?}");
    };
    assert!(table.confirm(slot));
    slot
}

#[test]
fn three_pairs_fill_slots_in_order_and_fourth_is_rejected() {
    let mut table = PairSlotTable::new();

    let ab = reserve_and_confirm(&mut table, HubPort::A, HubPort::B);
    let cd = reserve_and_confirm(&mut table, HubPort::C, HubPort::D);
    let ef = reserve_and_confirm(&mut table, HubPort::E, HubPort::F);

    assert_eq!((ab.index, cd.index, ef.index), (0, 1, 2));

    let err = table
        .reserve(HubPort::A, HubPort::C)
        .expect_err("fourth pair must fail");
    assert!(matches!(err, AppError::CapacityExceeded(_)));
    assert_eq!(table.snapshot().len(), usize::from(PAIR_SLOT_COUNT));
}

#[test]
fn reacquiring_a_paired_combination_returns_existing_slot() {
    let mut table = PairSlotTable::new();
    let ab = reserve_and_confirm(&mut table, HubPort::A, HubPort::B);

    let again = table.reserve(HubPort::A, HubPort::B).expect("re-acquire");

    assert_eq!(again, Reservation::Existing(ab));
}

#[test]
fn port_order_matters() {
    let mut table = PairSlotTable::new();
    let ab = reserve_and_confirm(&mut table, HubPort::A, HubPort::B);

    let ba = reserve_and_confirm(&mut table, HubPort::B, HubPort::A);

    assert_ne!(ab.index, ba.index);
}

#[test]
fn released_slot_index_is_reused_by_a_new_combination() {
    let mut table = PairSlotTable::new();
    let ab = reserve_and_confirm(&mut table, HubPort::A, HubPort::B);
    reserve_and_confirm(&mut table, HubPort::C, HubPort::D);
    reserve_and_confirm(&mut table, HubPort::E, HubPort::F);

    table.release(ab).expect("release");
    assert_eq!(table.status(ab), Some(SlotStatus::Released));

    let ac = reserve_and_confirm(&mut table, HubPort::A, HubPort::C);

    assert_eq!(ac.index, 0);
    assert_eq!(table.status(ab), None, "released entry is evicted");
}

#[test]
fn released_slot_stays_visible_until_next_reservation() {
    let mut table = PairSlotTable::new();
    let ab = reserve_and_confirm(&mut table, HubPort::A, HubPort::B);

    table.release(ab).expect("release");

    assert_eq!(table.snapshot(), vec![(ab, SlotStatus::Released)]);
}

#[test]
fn reacquiring_a_released_combination_repairs_in_place() {
    let mut table = PairSlotTable::new();
    reserve_and_confirm(&mut table, HubPort::A, HubPort::B);
    let cd = reserve_and_confirm(&mut table, HubPort::C, HubPort::D);
    table.release(cd).expect("release");

    let again = table.reserve(HubPort::C, HubPort::D).expect("re-acquire");

    assert_eq!(again, Reservation::NeedsPairing(cd));
    assert_eq!(table.status(cd), Some(SlotStatus::Pairing));
}

#[test]
fn in_flight_pairing_is_not_evicted() {
    let mut table = PairSlotTable::new();
    let first = table.reserve(HubPort::A, HubPort::B).expect("reserve").slot();

    let second = table.reserve(HubPort::C, HubPort::D).expect("reserve").slot();

    assert_eq!(table.status(first), Some(SlotStatus::Pairing));
    assert_eq!(second.index, 1);
    assert_eq!(
        table.reserve(HubPort::A, HubPort::B).expect("re-acquire"),
        Reservation::Existing(first)
    );
}

#[test]
fn rollback_frees_the_index() {
    let mut table = PairSlotTable::new();
    let slot = table.reserve(HubPort::A, HubPort::B).expect("reserve").slot();

    table.rollback(slot);

    assert!(table.snapshot().is_empty());
    let next = table.reserve(HubPort::C, HubPort::D).expect("reserve").slot();
    assert_eq!(next.index, 0);
}

#[test]
fn rollback_does_not_touch_paired_slots() {
    let mut table = PairSlotTable::new();
    let ab = reserve_and_confirm(&mut table, HubPort::A, HubPort::B);

    table.rollback(ab);

    assert_eq!(table.status(ab), Some(SlotStatus::Paired));
}

#[test]
fn releasing_unknown_slot_is_not_found() {
    let mut table = PairSlotTable::new();
    let slot = PairSlot {
        index: 1,
        left: HubPort::A,
        right: HubPort::B,
    };

    let err = table.release(slot).expect_err("unknown slot");

    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn statements_use_numeric_ports() {
    let slot = PairSlot {
        index: 2,
        left: HubPort::C,
        right: HubPort::F,
    };

    assert_eq!(slot.pair_statement(), "motor_pair.pair(2, 2, 5)");
    assert_eq!(slot.unpair_statement(), "motor_pair.unpair(2)");
}
