//! Grant storage trait.
//!
//! Defines the append-only record log for custom permission grants and
//! resource-scoped role assignments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::rbac::{PermissionPattern, ResourceType, Role};
use crate::storage::Revocation;
use crate::types::ResourceInstance;

// =============================================================================
// Grant Types
// =============================================================================

/// Where a resource-scoped role applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleScope {
    /// One specific resource instance.
    Resource {
        /// Resource type.
        resource_type: ResourceType,
        /// Resource id.
        id: String,
    },
    /// Every resource attached to a practice location.
    Location {
        /// Location id.
        id: String,
    },
}

impl RoleScope {
    /// Returns `true` if the scope covers the instance.
    #[must_use]
    pub fn covers(&self, instance: &ResourceInstance) -> bool {
        match self {
            Self::Resource { resource_type, id } => {
                *resource_type == instance.resource_type && *id == instance.id
            }
            Self::Location { id } => instance.location_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl std::fmt::Display for RoleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource { resource_type, id } => write!(f, "{resource_type}/{id}"),
            Self::Location { id } => write!(f, "location/{id}"),
        }
    }
}

/// What a grant confers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantKind {
    /// Ad-hoc permissions beyond the subject's role.
    Permissions {
        /// Granted permission patterns.
        permissions: Vec<PermissionPattern>,
    },
    /// A role that applies only within a scope.
    ScopedRole {
        /// The scoped role.
        role: Role,
        /// Where the role applies.
        scope: RoleScope,
    },
}

/// A provenance-tracked grant attached to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Grant id.
    pub id: Uuid,

    /// Subject receiving the grant.
    pub subject_id: String,

    /// What the grant confers.
    pub kind: GrantKind,

    /// Subject id of the grantor.
    pub granted_by: String,

    /// Grantor's primary role at grant time.
    pub granted_by_role: Role,

    /// When the grant was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,

    /// Free-text justification.
    pub reason: String,

    /// When the grant stops applying.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl Grant {
    /// Returns `true` if the grant has not expired at `now`.
    #[must_use]
    pub fn is_current(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|expiry| now < expiry)
    }

    /// Returns the granted permission patterns (empty for scoped roles).
    #[must_use]
    pub fn permissions(&self) -> &[PermissionPattern] {
        match &self.kind {
            GrantKind::Permissions { permissions } => permissions,
            GrantKind::ScopedRole { .. } => &[],
        }
    }
}

/// One entry in a subject's grant log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum GrantRecord {
    /// A grant was issued.
    Granted(Grant),
    /// An earlier grant was revoked.
    Revoked(Revocation),
}

// =============================================================================
// Grant Log
// =============================================================================

/// A subject's full grant history, as read at one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantLog {
    /// Records in append order.
    pub records: Vec<GrantRecord>,
    /// Version the log was read at; equals the number of records.
    pub version: u64,
}

impl GrantLog {
    /// Creates a log from its records.
    #[must_use]
    pub fn new(records: Vec<GrantRecord>) -> Self {
        let version = records.len() as u64;
        Self { records, version }
    }

    /// Returns `true` if a revocation targets `grant_id`.
    #[must_use]
    pub fn is_revoked(&self, grant_id: Uuid) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r, GrantRecord::Revoked(rev) if rev.target == grant_id))
    }

    /// Finds a grant by id, revoked or not.
    #[must_use]
    pub fn find(&self, grant_id: Uuid) -> Option<&Grant> {
        self.records.iter().find_map(|r| match r {
            GrantRecord::Granted(g) if g.id == grant_id => Some(g),
            _ => None,
        })
    }

    /// Returns grants that are neither revoked nor expired at `now`.
    #[must_use]
    pub fn active(&self, now: OffsetDateTime) -> Vec<&Grant> {
        self.records
            .iter()
            .filter_map(|r| match r {
                GrantRecord::Granted(g) if g.is_current(now) && !self.is_revoked(g.id) => Some(g),
                _ => None,
            })
            .collect()
    }

    /// Returns the active permission patterns at `now`.
    #[must_use]
    pub fn active_permissions(&self, now: OffsetDateTime) -> Vec<PermissionPattern> {
        self.active(now)
            .into_iter()
            .flat_map(|g| g.permissions().iter().copied())
            .collect()
    }

    /// Returns the active scoped roles at `now`.
    #[must_use]
    pub fn active_scoped_roles(&self, now: OffsetDateTime) -> Vec<(Role, &RoleScope)> {
        self.active(now)
            .into_iter()
            .filter_map(|g| match &g.kind {
                GrantKind::ScopedRole { role, scope } => Some((*role, scope)),
                GrantKind::Permissions { .. } => None,
            })
            .collect()
    }
}

// =============================================================================
// Grant Storage Trait
// =============================================================================

/// Storage operations for grant logs.
///
/// # Example
///
/// ```ignore
/// use praxis_auth::storage::GrantStorage;
///
/// async fn example(storage: &impl GrantStorage) -> AuthResult<()> {
///     let log = storage.load("u-17").await?;
///     storage.append("u-17", log.version, record).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Loads a subject's grant log. Unknown subjects have an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn load(&self, subject_id: &str) -> AuthResult<GrantLog>;

    /// Appends a record if the log is still at `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::VersionConflict` if the log moved on, or a storage
    /// error if the write fails.
    async fn append(
        &self,
        subject_id: &str,
        expected_version: u64,
        record: GrantRecord,
    ) -> AuthResult<u64>;

    /// Returns the subject a grant was issued to.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn subject_of(&self, grant_id: Uuid) -> AuthResult<Option<String>>;
}
