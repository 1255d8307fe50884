#![forbid(unsafe_code)]

//! Async client for the LEGO SPIKE hub MicroPython REPL.
//!
//! Turns the hub's single half-duplex serial REPL into a command/response
//! API that many tasks can share, and manages the hub's three motor-pair
//! slots. Start with [`ReplSession`].

pub mod config;
pub mod control;
pub mod errors;
pub mod models;
pub mod repl;
pub mod transport;

pub use config::ReplConfig;
pub use errors::{AppError, Result};
pub use models::pair::{PairSlot, SlotStatus};
pub use models::port::HubPort;
pub use repl::session::{ReplSession, SessionState};
