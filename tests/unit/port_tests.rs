//! Unit tests for hub port parsing.

use spike_repl::{AppError, HubPort};

#[test]
fn ports_parse_case_insensitively() {
    assert_eq!("a".parse::<HubPort>().expect("a"), HubPort::A);
    assert_eq!(" F ".parse::<HubPort>().expect("F"), HubPort::F);
}

#[test]
fn unknown_port_is_rejected() {
    let err = "G".parse::<HubPort>().expect_err("G is not a port");

    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn display_round_trips_through_parse() {
    for port in HubPort::ALL {
        assert_eq!(port.to_string().parse::<HubPort>().expect("parse"), port);
    }
}

#[test]
fn numbers_follow_wire_order() {
    let numbers: Vec<u8> = HubPort::ALL.iter().map(|p| p.number()).collect();

    assert_eq!(numbers, vec![0, 1, 2, 3, 4, 5]);
}
