//! Search specifications
//!
//! Composable specifications for deciding which entities a caller may search
//! and which scored results survive.

use crate::domain::specification::{AndSpecification, Specification};

use super::entity::{CallerIdentity, SearchResult};
use super::registry::EntityDefinition;

/// Entities that require authentication need a caller identity
pub struct AuthSatisfiedSpec {
    authenticated: bool,
}

impl AuthSatisfiedSpec {
    pub fn new(identity: &CallerIdentity) -> Self {
        Self {
            authenticated: identity.is_authenticated(),
        }
    }
}

impl Specification<EntityDefinition> for AuthSatisfiedSpec {
    fn is_satisfied_by(&self, def: &EntityDefinition) -> bool {
        !def.config.permissions.require_auth || self.authenticated
    }
}

/// A caller-supplied role must be in the entity's allowed roles.
///
/// Callers without a role and entities without a role list pass.
pub struct RoleAllowedSpec {
    role: Option<String>,
}

impl RoleAllowedSpec {
    pub fn new(identity: &CallerIdentity) -> Self {
        Self {
            role: identity.role.clone(),
        }
    }
}

impl Specification<EntityDefinition> for RoleAllowedSpec {
    fn is_satisfied_by(&self, def: &EntityDefinition) -> bool {
        let allowed = &def.config.permissions.allowed_roles;
        match &self.role {
            Some(role) if !allowed.is_empty() => allowed.iter().any(|r| r == role),
            _ => true,
        }
    }
}

/// Full access check for one caller
pub fn access_allowed(identity: &CallerIdentity) -> AndSpecification<EntityDefinition> {
    AuthSatisfiedSpec::new(identity).and(RoleAllowedSpec::new(identity))
}

/// Specification for minimum relevance score
pub struct MinRelevanceSpec {
    min_score: f64,
}

impl MinRelevanceSpec {
    /// Create a new minimum relevance specification
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }
}

impl Specification<SearchResult> for MinRelevanceSpec {
    fn is_satisfied_by(&self, result: &SearchResult) -> bool {
        result.score >= self.min_score
    }
}
