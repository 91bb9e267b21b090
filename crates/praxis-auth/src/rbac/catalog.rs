//! Permission catalog.
//!
//! Maps every canonical `(resource type, action)` pair to the minimal role
//! that may perform it, and carries the self-service, clearance and consent
//! tables the evaluator consults. The catalog is built once from
//! configuration and injected into the evaluator; there is no global instance.
//!
//! # Example
//!
//! ```ignore
//! use praxis_auth::rbac::{PermissionCatalog, Role, ResourceType, Action};
//!
//! let catalog = PermissionCatalog::default();
//! assert!(catalog.role_allows(Role::Arzt, ResourceType::Treatment, Action::Update));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{CatalogConfig, ConfigError};
use crate::rbac::{Role, RoleHierarchy, UnknownValue};
use crate::types::Confidentiality;

// =============================================================================
// Resource Type
// =============================================================================

/// Domain resource types subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Patient master record.
    Patient,
    /// Appointment in the calendar.
    Appointment,
    /// Invoice or billing record.
    Invoice,
    /// Stored document (letters, scans, reports).
    Document,
    /// Treatment record.
    Treatment,
    /// Staff user account.
    User,
    /// Practice settings.
    Settings,
    /// Authorization audit log.
    AuditLog,
}

impl ResourceType {
    /// All resource types.
    pub const ALL: [ResourceType; 8] = [
        ResourceType::Patient,
        ResourceType::Appointment,
        ResourceType::Invoice,
        ResourceType::Document,
        ResourceType::Treatment,
        ResourceType::User,
        ResourceType::Settings,
        ResourceType::AuditLog,
    ];

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Appointment => "appointment",
            Self::Invoice => "invoice",
            Self::Document => "document",
            Self::Treatment => "treatment",
            Self::User => "user",
            Self::Settings => "settings",
            Self::AuditLog => "audit_log",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|rt| rt.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue::new("resource type", s))
    }
}

// =============================================================================
// Action
// =============================================================================

/// Actions a subject can request on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read a record.
    Read,
    /// Create a record.
    Create,
    /// Modify a record.
    Update,
    /// Delete a record.
    Delete,
    /// Export a record outside the practice (e.g. to a third-party system).
    Export,
}

impl Action {
    /// All actions.
    pub const ALL: [Action; 5] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Export,
    ];

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue::new("action", s))
    }
}

// =============================================================================
// Permissions and Patterns
// =============================================================================

/// A canonical `(resource type, action)` pair, written `patient:read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permission {
    /// Resource type.
    pub resource_type: ResourceType,
    /// Action.
    pub action: Action,
}

impl Permission {
    /// Creates a permission.
    #[must_use]
    pub fn new(resource_type: ResourceType, action: Action) -> Self {
        Self {
            resource_type,
            action,
        }
    }

    /// Returns every canonical permission.
    pub fn all() -> impl Iterator<Item = Permission> {
        ResourceType::ALL
            .into_iter()
            .flat_map(|rt| Action::ALL.into_iter().map(move |a| Permission::new(rt, a)))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.action)
    }
}

/// Resource side of a permission pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourcePattern {
    /// Matches every resource type (`*`).
    Any,
    /// Matches one resource type.
    Exact(ResourceType),
}

impl ResourcePattern {
    /// Returns `true` if the pattern matches `resource_type`.
    #[must_use]
    pub fn matches(&self, resource_type: ResourceType) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(rt) => *rt == resource_type,
        }
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(rt) => fmt::Display::fmt(rt, f),
        }
    }
}

/// Action side of a permission pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionPattern {
    /// Matches every action (`*`).
    Any,
    /// Matches one action.
    Exact(Action),
}

impl ActionPattern {
    /// Returns `true` if the pattern matches `action`.
    #[must_use]
    pub fn matches(&self, action: Action) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(a) => *a == action,
        }
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(a) => fmt::Display::fmt(a, f),
        }
    }
}

/// A permission with optional wildcards, written `patient:*`, `*:read` or `*:*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionPattern {
    /// Resource side.
    pub resource: ResourcePattern,
    /// Action side.
    pub action: ActionPattern,
}

impl PermissionPattern {
    /// Creates a pattern.
    #[must_use]
    pub fn new(resource: ResourcePattern, action: ActionPattern) -> Self {
        Self { resource, action }
    }

    /// The full wildcard `*:*`.
    #[must_use]
    pub fn any() -> Self {
        Self::new(ResourcePattern::Any, ActionPattern::Any)
    }

    /// Returns `true` if the pattern matches the pair.
    #[must_use]
    pub fn matches(&self, resource_type: ResourceType, action: Action) -> bool {
        self.resource.matches(resource_type) && self.action.matches(action)
    }

    /// Returns `true` if neither side is a wildcard.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(
            (self.resource, self.action),
            (ResourcePattern::Exact(_), ActionPattern::Exact(_))
        )
    }

    /// Number of wildcard sides; used to apply broad patterns before narrow ones.
    #[must_use]
    pub fn wildcard_count(&self) -> u8 {
        u8::from(self.resource == ResourcePattern::Any) + u8::from(self.action == ActionPattern::Any)
    }

    /// Returns every canonical permission the pattern covers.
    pub fn covered(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::all().filter(move |p| self.matches(p.resource_type, p.action))
    }
}

impl From<Permission> for PermissionPattern {
    fn from(p: Permission) -> Self {
        Self::new(
            ResourcePattern::Exact(p.resource_type),
            ActionPattern::Exact(p.action),
        )
    }
}

impl fmt::Display for PermissionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for PermissionPattern {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| UnknownValue::new("permission", s))?;

        let resource = match resource.trim() {
            "*" => ResourcePattern::Any,
            other => ResourcePattern::Exact(other.parse()?),
        };
        let action = match action.trim() {
            "*" => ActionPattern::Any,
            other => ActionPattern::Exact(other.parse()?),
        };
        Ok(Self::new(resource, action))
    }
}

impl Serialize for PermissionPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PermissionPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Default Tables
// =============================================================================

/// Built-in minimal role for a permission.
#[must_use]
pub fn default_minimal_role(resource_type: ResourceType, action: Action) -> Role {
    use Action as A;
    use ResourceType as R;
    use Role::*;

    match (resource_type, action) {
        (R::Patient, A::Read | A::Create) => Rezeption,
        (R::Patient, A::Update) => Assistent,
        (R::Patient, A::Delete) => Admin,
        (R::Patient, A::Export) => Arzt,

        (R::Appointment, A::Read | A::Create | A::Update) => Rezeption,
        (R::Appointment, A::Delete) => Assistent,
        (R::Appointment, A::Export) => Admin,

        (R::Invoice, A::Read) => Rezeption,
        (R::Invoice, A::Create | A::Update) => Assistent,
        (R::Invoice, A::Delete | A::Export) => Admin,

        (R::Document, A::Read | A::Create) => Assistent,
        (R::Document, A::Update | A::Export) => Arzt,
        (R::Document, A::Delete) => Admin,

        (R::Treatment, A::Read) => Assistent,
        (R::Treatment, A::Create | A::Update | A::Export) => Arzt,
        (R::Treatment, A::Delete) => Admin,

        (R::User, _) => Admin,

        (R::Settings, A::Read | A::Create | A::Update) => Admin,
        (R::Settings, A::Delete | A::Export) => Superadmin,

        (R::AuditLog, A::Read | A::Export) => Admin,
        (R::AuditLog, A::Create | A::Update | A::Delete) => Superadmin,
    }
}

/// Built-in self-service table: actions an owner may perform on own instances.
#[must_use]
pub fn default_self_service() -> BTreeMap<ResourceType, BTreeSet<Action>> {
    BTreeMap::from([
        (ResourceType::Patient, BTreeSet::from([Action::Read])),
        (ResourceType::Appointment, BTreeSet::from([Action::Read])),
        (ResourceType::Invoice, BTreeSet::from([Action::Read])),
        (ResourceType::Document, BTreeSet::from([Action::Read])),
    ])
}

/// Built-in clearance table for tiers above normal.
#[must_use]
pub fn default_clearance() -> BTreeMap<Confidentiality, Role> {
    BTreeMap::from([
        (Confidentiality::Sensitive, Role::Assistent),
        (Confidentiality::HighlySensitive, Role::Arzt),
    ])
}

/// Built-in set of consent-requiring actions.
#[must_use]
pub fn default_consent_actions() -> BTreeSet<Action> {
    BTreeSet::from([Action::Export])
}

// =============================================================================
// Permission Catalog
// =============================================================================

/// Canonical permission table and the auxiliary tables used by the evaluator.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    hierarchy: RoleHierarchy,
    minimal_roles: HashMap<Permission, Role>,
    self_service: BTreeMap<ResourceType, BTreeSet<Action>>,
    clearance: BTreeMap<Confidentiality, Role>,
    consent_actions: BTreeSet<Action>,
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::new(RoleHierarchy::default())
    }
}

impl PermissionCatalog {
    /// Creates a catalog with the built-in tables over `hierarchy`.
    #[must_use]
    pub fn new(hierarchy: RoleHierarchy) -> Self {
        Self {
            hierarchy,
            minimal_roles: Permission::all()
                .map(|p| (p, default_minimal_role(p.resource_type, p.action)))
                .collect(),
            self_service: default_self_service(),
            clearance: default_clearance(),
            consent_actions: default_consent_actions(),
        }
    }

    /// Builds a catalog from configuration.
    ///
    /// Permission overrides are applied broadest first, so `patient:read`
    /// wins over `patient:*` regardless of declaration order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a permission key cannot be parsed.
    pub fn from_config(
        config: &CatalogConfig,
        hierarchy: RoleHierarchy,
    ) -> Result<Self, ConfigError> {
        let mut catalog = Self::new(hierarchy);

        let mut overrides = config
            .permissions
            .iter()
            .map(|(key, role)| {
                key.parse::<PermissionPattern>()
                    .map(|pattern| (pattern, *role))
                    .map_err(|e| ConfigError::InvalidValue(format!("catalog.permissions: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        overrides.sort_by_key(|(pattern, _)| std::cmp::Reverse(pattern.wildcard_count()));

        for (pattern, role) in overrides {
            for permission in pattern.covered() {
                catalog.minimal_roles.insert(permission, role);
            }
        }

        catalog.self_service = config
            .self_service
            .iter()
            .map(|(rt, actions)| {
                rt.parse::<ResourceType>()
                    .map(|rt| (rt, actions.iter().copied().collect()))
                    .map_err(|e| ConfigError::InvalidValue(format!("catalog.self_service: {e}")))
            })
            .collect::<Result<_, _>>()?;
        catalog.clearance = config
            .clearance
            .iter()
            .map(|(tier, role)| {
                tier.parse::<Confidentiality>()
                    .map(|tier| (tier, *role))
                    .map_err(|e| ConfigError::InvalidValue(format!("catalog.clearance: {e}")))
            })
            .collect::<Result<_, _>>()?;
        catalog.consent_actions = config.consent_actions.iter().copied().collect();

        Ok(catalog)
    }

    /// Returns the role hierarchy the catalog compares against.
    #[must_use]
    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    /// Returns the minimal role for a pair. Pairs without an entry require the top role.
    #[must_use]
    pub fn minimal_role(&self, resource_type: ResourceType, action: Action) -> Role {
        self.minimal_roles
            .get(&Permission::new(resource_type, action))
            .copied()
            .unwrap_or_else(|| self.hierarchy.top_role())
    }

    /// Returns `true` if `role` meets the catalog default for the pair.
    #[must_use]
    pub fn role_allows(&self, role: Role, resource_type: ResourceType, action: Action) -> bool {
        self.hierarchy
            .is_at_least(role, self.minimal_role(resource_type, action))
    }

    /// Returns the role implied by holding every permission `pattern` covers.
    ///
    /// This is the highest minimal role among the covered pairs; the full
    /// wildcard always implies the top role.
    #[must_use]
    pub fn implied_role(&self, pattern: &PermissionPattern) -> Role {
        if *pattern == PermissionPattern::any() {
            return self.hierarchy.top_role();
        }
        self.hierarchy
            .highest(
                pattern
                    .covered()
                    .map(|p| self.minimal_role(p.resource_type, p.action)),
            )
            .unwrap_or_else(|| self.hierarchy.top_role())
    }

    /// Returns the rank of [`implied_role`](Self::implied_role).
    #[must_use]
    pub fn implied_rank(&self, pattern: &PermissionPattern) -> u16 {
        self.hierarchy.rank(self.implied_role(pattern))
    }

    /// Returns `true` if owners may perform `action` on their own `resource_type` instances.
    #[must_use]
    pub fn is_self_service(&self, resource_type: ResourceType, action: Action) -> bool {
        self.self_service
            .get(&resource_type)
            .is_some_and(|actions| actions.contains(&action))
    }

    /// Returns the minimum role for a tier, or `None` if the tier is unrestricted.
    ///
    /// A restricted tier without a table entry requires the top role.
    #[must_use]
    pub fn required_clearance(&self, tier: Confidentiality) -> Option<Role> {
        if !tier.is_restricted() {
            return None;
        }
        Some(
            self.clearance
                .get(&tier)
                .copied()
                .unwrap_or_else(|| self.hierarchy.top_role()),
        )
    }

    /// Returns `true` if `role` clears the tier.
    #[must_use]
    pub fn meets_clearance(&self, role: Role, tier: Confidentiality) -> bool {
        self.required_clearance(tier)
            .is_none_or(|required| self.hierarchy.is_at_least(role, required))
    }

    /// Returns `true` if the action requires subject consent.
    #[must_use]
    pub fn requires_consent(&self, action: Action) -> bool {
        self.consent_actions.contains(&action)
    }

    /// Coarse permission check combining the role default with granted patterns.
    ///
    /// `granted` must already be filtered to active (non-expired, non-revoked)
    /// grants. A wildcard `requested` pattern requires every pair it covers.
    #[must_use]
    pub fn has_permission(
        &self,
        role: Role,
        granted: &[PermissionPattern],
        requested: &PermissionPattern,
    ) -> bool {
        if self.hierarchy.is_top(role) {
            return true;
        }
        requested.covered().all(|p| {
            self.role_allows(role, p.resource_type, p.action)
                || granted
                    .iter()
                    .any(|g| g.matches(p.resource_type, p.action))
        })
    }

    /// Returns `true` if every requested permission is held.
    #[must_use]
    pub fn has_all_permissions(
        &self,
        role: Role,
        granted: &[PermissionPattern],
        requested: &[PermissionPattern],
    ) -> bool {
        requested
            .iter()
            .all(|p| self.has_permission(role, granted, p))
    }

    /// Returns `true` if at least one requested permission is held.
    #[must_use]
    pub fn has_any_permission(
        &self,
        role: Role,
        granted: &[PermissionPattern],
        requested: &[PermissionPattern],
    ) -> bool {
        requested
            .iter()
            .any(|p| self.has_permission(role, granted, p))
    }

    /// Returns the full permission table, sorted.
    #[must_use]
    pub fn entries(&self) -> Vec<(Permission, Role)> {
        let mut entries: Vec<_> = self.minimal_roles.iter().map(|(p, r)| (*p, *r)).collect();
        entries.sort();
        entries
    }
}
