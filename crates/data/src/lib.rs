//! Durable storage for the fail-safe control core.
//!
//! This crate provides audit sink implementations:
//! - JSON-lines file sink, one audit record per line

/// Audit sinks.
pub mod sinks;

pub use sinks::JsonlAuditSink;
