//! Domain model module declarations.

pub mod pair;
pub mod port;
