//! # praxis-auth
//!
//! Authorization core for the Praxis practice-management system.
//!
//! This crate provides:
//! - A fixed role hierarchy and a canonical permission catalog
//! - Resource-scoped roles and ad-hoc permission grants with provenance
//! - Time-bounded delegation of authority
//! - Contextual restrictions (business hours, IP allow-lists, consent)
//! - A confidentiality ceiling no grant can override
//! - An append-only audit trail with one entry per decision
//!
//! ## Overview
//!
//! A thin adapter maps an inbound operation to a subject, an action and a
//! target resource, then calls [`PolicyEvaluator::authorize`]. The evaluator
//! reads grants, delegations and the target instance fresh on every call,
//! produces a [`Decision`], and records it before returning.
//!
//! ## Modules
//!
//! - [`config`] - Authorization configuration
//! - [`rbac`] - Roles, ranks and the permission catalog
//! - [`types`] - Subjects and resource instances
//! - [`policy`] - The decision engine and its inputs
//! - [`storage`] - Grant, delegation and subject stores
//! - [`admin`] - Grant and delegation administration
//! - [`audit`] - Decision audit trail

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod policy;
pub mod rbac;
pub mod storage;
pub mod types;

pub use admin::GrantService;
pub use audit::{
    AuditEntry, AuditFilter, AuditOutcome, AuditRecorder, InMemoryAuditLog, QueuedAuditRecorder,
};
pub use config::{AuthzConfig, ConfigError, FailureMode};
pub use error::{AdminError, AuthError, ErrorCategory};
pub use policy::{
    AuthorizeRequest, BusinessHours, ConstraintSet, Decision, EvaluationContext,
    InMemoryResourceLoader, IpAllowList, PolicyEvaluator, ReasonCode, ResourceLoader, Rule,
    SubjectSummary, Target,
};
pub use rbac::{Action, PermissionCatalog, PermissionPattern, ResourceType, Role, RoleHierarchy};
pub use storage::{
    AuthzStores, DelegationStorage, GrantStorage, InMemoryDelegationStorage, InMemoryGrantStorage,
    InMemorySubjectStorage, RoleScope, SubjectStorage, ValidityWindow,
};
pub use types::{Confidentiality, ResourceInstance, Subject};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use praxis_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::admin::GrantService;
    pub use crate::audit::{AuditEntry, AuditFilter, AuditOutcome, AuditRecorder};
    pub use crate::config::{AuthzConfig, ConfigError, FailureMode};
    pub use crate::error::{AdminError, AuthError, ErrorCategory};
    pub use crate::policy::{
        AuthorizeRequest, ConstraintSet, Decision, EvaluationContext, PolicyEvaluator, ReasonCode,
        ResourceLoader, Rule, Target,
    };
    pub use crate::rbac::{
        Action, ActionPattern, PermissionCatalog, PermissionPattern, ResourcePattern,
        ResourceType, Role, RoleHierarchy,
    };
    pub use crate::storage::{AuthzStores, RoleScope, ValidityWindow};
    pub use crate::types::{Confidentiality, ResourceInstance, Subject};
}
