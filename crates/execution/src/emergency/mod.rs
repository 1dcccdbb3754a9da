//! Emergency response.
//!
//! Turns severe incidents into coordinated remediation:
//! - Team notification over configurable channels
//! - Concurrent remediation procedures chosen per incident kind
//! - Escalation of breaker trips into incidents
//! - Bounded incident log with audit records

mod channels;
mod coordinator;
mod escalation;
mod procedures;

pub use channels::*;
pub use coordinator::*;
pub use escalation::*;
pub use procedures::*;
