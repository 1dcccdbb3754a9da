//! Audit trail for trigger events, overrides, recoveries and incidents.
//!
//! The core treats durable storage as an append-only collaborator that may be
//! unavailable; records are buffered in memory until the sink recovers.

mod memory;
mod trail;

pub use memory::*;
pub use trail::*;
