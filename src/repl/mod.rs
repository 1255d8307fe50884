//! REPL protocol engine.
//!
//! - `correlator`: request id allocation and reply delivery.
//! - `reader`: background task that turns hub output into resolved replies.
//! - `session`: the public [`ReplSession`](session::ReplSession) surface.
//! - `tag`: the `ID<id>:` reply tag and statement wrapping.

pub mod correlator;
pub mod reader;
pub mod session;
pub mod tag;
