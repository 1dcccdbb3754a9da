//! Fail-safe control core.
//!
//! This crate provides the runtime side of the circuit breaker system:
//! - Breaker registry and evaluator with cooldown and auto-recovery
//! - Ordered, time-bounded remediation action dispatch
//! - Circuit breaker engine with authorized manual trip and reset
//! - Emergency response coordination with team notification
//! - Append-only audit trail tolerant of sink outages
//! - Periodic evaluation against a metrics source

/// Prelude module for convenient imports.
pub mod prelude;

/// Audit trail.
pub mod audit;
/// Authorization for manual operations.
pub mod auth;
/// Breaker registry and evaluator.
pub mod breaker;
/// Time source.
pub mod clock;
/// Remediation action dispatch.
pub mod dispatch;
/// Emergency response.
pub mod emergency;
/// Circuit breaker engine.
pub mod engine;
/// Periodic evaluation.
pub mod monitor;
