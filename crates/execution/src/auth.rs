//! Authorization for manual breaker operations.
//!
//! The core does not decide who may trip or reset a breaker; it asks an
//! [`Authorizer`] and trusts the answer.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Manual operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManualOperation {
    /// Force a breaker open.
    Trip,
    /// Close a breaker.
    Reset,
}

impl fmt::Display for ManualOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trip => f.write_str("trip"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

/// Decides whether an actor may perform a manual operation.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns `true` if `actor` may perform `operation` on `breaker`.
    async fn authorize(&self, actor: &str, operation: ManualOperation, breaker: &str) -> bool;
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _actor: &str, _operation: ManualOperation, _breaker: &str) -> bool {
        true
    }
}

/// User roles for access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Can view status only.
    Viewer,
    /// Can trip breakers.
    Operator,
    /// Can trip and reset breakers.
    Admin,
}

impl Role {
    /// Checks if this role permits the operation.
    #[must_use]
    pub fn permits(&self, operation: ManualOperation) -> bool {
        match (self, operation) {
            (Self::Admin, _) => true,
            (Self::Operator, ManualOperation::Trip) => true,
            _ => false,
        }
    }

    /// Parses a role from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "viewer" | "readonly" | "read_only" => Some(Self::Viewer),
            "operator" => Some(Self::Operator),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Grants operations from a static actor-to-roles table.
#[derive(Debug, Clone, Default)]
pub struct RoleAuthorizer {
    roles: HashMap<String, HashSet<Role>>,
}

impl RoleAuthorizer {
    /// Creates an authorizer with no actors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants a role to an actor.
    #[must_use]
    pub fn grant(mut self, actor: impl Into<String>, role: Role) -> Self {
        self.roles.entry(actor.into()).or_default().insert(role);
        self
    }
}

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn authorize(&self, actor: &str, operation: ManualOperation, _breaker: &str) -> bool {
        self.roles
            .get(actor)
            .is_some_and(|roles| roles.iter().any(|r| r.permits(operation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(Role::Admin.permits(ManualOperation::Reset));
        assert!(Role::Operator.permits(ManualOperation::Trip));
        assert!(!Role::Operator.permits(ManualOperation::Reset));
        assert!(!Role::Viewer.permits(ManualOperation::Trip));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("root"), None);
    }

    #[tokio::test]
    async fn test_role_authorizer() {
        let auth = RoleAuthorizer::new()
            .grant("ops1", Role::Operator)
            .grant("lead", Role::Admin);

        assert!(auth.authorize("ops1", ManualOperation::Trip, "dailyLoss").await);
        assert!(!auth.authorize("ops1", ManualOperation::Reset, "dailyLoss").await);
        assert!(auth.authorize("lead", ManualOperation::Reset, "dailyLoss").await);
        assert!(!auth.authorize("intruder", ManualOperation::Trip, "dailyLoss").await);
    }
}
