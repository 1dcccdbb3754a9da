//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use failsafe_execution::prelude::*;
//! ```

// Audit
pub use crate::audit::{AuditConfig, AuditSink, AuditTrail, MemoryAuditSink};

// Auth
pub use crate::auth::{AllowAll, Authorizer, ManualOperation, Role, RoleAuthorizer};

// Breakers
pub use crate::breaker::{BreakerRegistry, Verdict};

// Clock
pub use crate::clock::{Clock, ManualClock, SystemClock};

// Dispatch
pub use crate::dispatch::{
    ActionCatalog, ActionContext, ActionDispatcher, ActionSpec, ConfirmationGateway,
    ConfirmationRequest, DenyAllConfirmations, DispatcherConfig, RemediationProcedure,
};

// Emergency
pub use crate::emergency::{
    ConsoleChannel, CoordinatorConfig, EmergencyContact, EmergencyCoordinator, EscalationPolicy,
    IncidentContext, IncidentProcedure, NotificationChannel, NotificationMessage, ProcedurePlan,
    ProcedureSet, WebhookChannel,
};

// Engine
pub use crate::engine::{CircuitBreakerEngine, CircuitBreakerEngineBuilder};

// Monitor
pub use crate::monitor::{EvaluationLoop, EvaluationLoopConfig, MetricsSource};
