//! Remediation action dispatch.
//!
//! Provides:
//! - Action registration with priorities and maximum durations
//! - Confirmation gating for actions needing human sign-off
//! - Ordered, time-bounded, failure-isolated execution of action lists

mod action;
mod dispatcher;

pub use action::*;
pub use dispatcher::*;
