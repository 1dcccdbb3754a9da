//! Breaker registry and evaluator.
//!
//! Provides:
//! - Trigger predicates over metrics snapshots
//! - Per-breaker lifecycle (closed, open, forced open) with cooldown
//! - Auto-recovery and manual trip/reset
//! - Read-only status snapshots

/// Trigger predicates.
pub mod predicate;
mod registry;

pub use predicate::Verdict;
pub use registry::*;
