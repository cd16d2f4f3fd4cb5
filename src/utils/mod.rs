//! Shared helpers for the runtime.

pub mod date;
pub mod hash;
pub mod path;
pub mod plural;
