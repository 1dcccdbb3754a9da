//! Audit sink implementations for durable persistence.

mod jsonl;

pub use jsonl::JsonlAuditSink;
