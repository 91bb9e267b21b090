//! Authorization decisions.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::constraints::ConstraintKind;
use crate::rbac::{PermissionPattern, Role};
use crate::storage::RoleScope;
use crate::types::Confidentiality;

// =============================================================================
// Reason Code
// =============================================================================

/// Closed set of decision reasons, returned verbatim to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// The subject holds the top role.
    RoleBypass,
    /// A rule allowed the request.
    Granted,
    /// No authenticated subject.
    Unauthenticated,
    /// No rule allowed the request.
    InsufficientPermission,
    /// A contextual predicate or the consent gate failed.
    ContextRestricted,
    /// The instance's confidentiality tier exceeds the effective role's clearance.
    SensitivityExceeded,
    /// The target instance does not exist.
    ResourceNotFound,
}

impl ReasonCode {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleBypass => "ROLE_BYPASS",
            Self::Granted => "GRANTED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            Self::ContextRestricted => "CONTEXT_RESTRICTED",
            Self::SensitivityExceeded => "SENSITIVITY_EXCEEDED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
        }
    }

    /// Returns `true` for the allow codes.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::RoleBypass | Self::Granted)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Matched Rule
// =============================================================================

/// The evaluation step that produced a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// An opted-in contextual predicate failed.
    ContextConstraint {
        /// The failing predicate.
        constraint: ConstraintKind,
    },
    /// No subject was supplied.
    Unauthenticated,
    /// The subject holds the top role.
    RoleBypass,
    /// The loader reported the instance missing.
    ResourceNotFound,
    /// A resource-scoped role covered the instance.
    ScopedRole {
        /// Grant carrying the scoped role.
        grant_id: Uuid,
        /// The scoped role.
        role: Role,
        /// Where it applies.
        scope: RoleScope,
    },
    /// The subject owns the instance and the action is self-service.
    SelfService,
    /// The subject's primary role meets the catalog default.
    RoleDefault {
        /// The role that satisfied the default.
        role: Role,
    },
    /// A custom permission grant matched.
    CustomGrant {
        /// The matching grant.
        grant_id: Uuid,
        /// The matching pattern.
        pattern: PermissionPattern,
    },
    /// The allow came from re-evaluating as a delegator.
    Delegation {
        /// The active delegation.
        delegation_id: Uuid,
        /// Whose authority was used.
        delegator_id: String,
        /// The rule that allowed the delegator.
        via: Box<Rule>,
    },
    /// The confidentiality ceiling overrode an allow.
    ConfidentialityCeiling {
        /// The instance's tier.
        tier: Confidentiality,
        /// Minimum role for the tier.
        required: Role,
    },
    /// The action needs consent the subject has not given.
    ConsentGate,
    /// No rule matched.
    NoMatch,
}

// =============================================================================
// Decision
// =============================================================================

/// What a denied subject held at evaluation time.
///
/// Only the requesting subject's own data appears here; a delegator's grants
/// are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    /// Primary role.
    pub role: Role,
    /// Active scoped roles, formatted `role@scope`.
    pub scoped_roles: Vec<String>,
    /// Active custom permission patterns.
    pub grants: Vec<PermissionPattern>,
}

/// Result of one `authorize` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request is permitted.
    pub allowed: bool,

    /// Why.
    pub reason: ReasonCode,

    /// The step that decided.
    pub matched_rule: Rule,

    /// The `resource_type:action` string that was checked.
    pub required_permission: String,

    /// Id of the audit entry written for this call.
    pub audit_id: Uuid,

    /// Requesting subject's holdings, present on deny.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_summary: Option<SubjectSummary>,

    /// The decision was made in fail-open degraded mode.
    #[serde(default)]
    pub degraded: bool,
}

impl Decision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Returns `true` if access was denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}
