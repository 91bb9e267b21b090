//! Grant and delegation administration.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::StorageConfig;
use crate::error::AdminError;
use crate::rbac::{ActionPattern, PermissionCatalog, PermissionPattern, ResourcePattern, Role};
use crate::storage::{
    AuthzStores, Delegation, DelegationLog, DelegationRecord, Grant, GrantKind, GrantLog,
    GrantRecord, Revocation, RoleScope, ValidityWindow,
};
use crate::types::Subject;

/// Validates and records grants, revocations and delegations.
///
/// Every mutation is checked against the grantor's own rank: nobody can hand
/// out authority they do not hold. Writes are optimistic; on a version
/// conflict the service re-reads the log, re-validates and retries up to
/// `storage.max_write_retries` times.
pub struct GrantService {
    catalog: Arc<PermissionCatalog>,
    stores: AuthzStores,
    config: StorageConfig,
}

impl GrantService {
    /// Creates a service over the given stores.
    #[must_use]
    pub fn new(catalog: Arc<PermissionCatalog>, stores: AuthzStores, config: StorageConfig) -> Self {
        Self {
            catalog,
            stores,
            config,
        }
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Grants `actions` on `resource` to a subject.
    ///
    /// # Errors
    ///
    /// - `INVALID_GRANT` for an empty action list or an expiry not in the future
    /// - `SUBJECT_NOT_FOUND` if the subject or grantor is unknown
    /// - `GRANT_ESCALATION_REJECTED` if any pattern implies a rank above the grantor's
    pub async fn grant(
        &self,
        subject_id: &str,
        resource: ResourcePattern,
        actions: &[ActionPattern],
        granted_by: &str,
        reason: &str,
        expires_at: Option<OffsetDateTime>,
    ) -> AuthResult<Grant> {
        if actions.is_empty() {
            return Err(AdminError::invalid_grant("at least one action is required").into());
        }
        let now = OffsetDateTime::now_utc();
        Self::check_expiry(expires_at, now)?;

        let grantor = self.require_subject(granted_by).await?;
        self.require_subject(subject_id).await?;

        let mut permissions: Vec<PermissionPattern> = actions
            .iter()
            .map(|action| PermissionPattern::new(resource, *action))
            .collect();
        permissions.dedup();

        let required = self
            .catalog
            .hierarchy()
            .highest(permissions.iter().map(|p| self.catalog.implied_role(p)))
            .unwrap_or_else(|| self.catalog.hierarchy().top_role());
        self.check_ceiling(&grantor, required)?;

        let grant = Grant {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            kind: GrantKind::Permissions { permissions },
            granted_by: grantor.id.clone(),
            granted_by_role: grantor.role,
            granted_at: now,
            reason: reason.to_string(),
            expires_at,
        };
        self.append_grant(subject_id, |_| Ok(GrantRecord::Granted(grant.clone())))
            .await?;

        tracing::info!(
            grant_id = %grant.id,
            subject = %subject_id,
            granted_by = %grantor.id,
            permissions = ?grant.permissions().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Permission grant recorded"
        );
        Ok(grant)
    }

    /// Assigns a role that applies only within `scope`.
    ///
    /// # Errors
    ///
    /// - `INVALID_GRANT` for an expiry not in the future
    /// - `SUBJECT_NOT_FOUND` if the subject or grantor is unknown
    /// - `GRANT_ESCALATION_REJECTED` if `role` ranks above the grantor
    pub async fn grant_scoped_role(
        &self,
        subject_id: &str,
        role: Role,
        scope: RoleScope,
        granted_by: &str,
        reason: &str,
        expires_at: Option<OffsetDateTime>,
    ) -> AuthResult<Grant> {
        let now = OffsetDateTime::now_utc();
        Self::check_expiry(expires_at, now)?;

        let grantor = self.require_subject(granted_by).await?;
        self.require_subject(subject_id).await?;
        self.check_ceiling(&grantor, role)?;

        let grant = Grant {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            kind: GrantKind::ScopedRole {
                role,
                scope: scope.clone(),
            },
            granted_by: grantor.id.clone(),
            granted_by_role: grantor.role,
            granted_at: now,
            reason: reason.to_string(),
            expires_at,
        };
        self.append_grant(subject_id, |_| Ok(GrantRecord::Granted(grant.clone())))
            .await?;

        tracing::info!(
            grant_id = %grant.id,
            subject = %subject_id,
            granted_by = %grantor.id,
            %role,
            %scope,
            "Scoped role recorded"
        );
        Ok(grant)
    }

    /// Revokes a grant by appending a superseding record.
    ///
    /// # Errors
    ///
    /// - `GRANT_NOT_FOUND` if the grant is unknown or already revoked
    /// - `SUBJECT_NOT_FOUND` if the revoker is unknown
    /// - `GRANT_ESCALATION_REJECTED` if the grant implies a rank above the revoker's
    pub async fn revoke(&self, grant_id: Uuid, revoked_by: &str, reason: &str) -> AuthResult<()> {
        let subject_id = self
            .stores
            .grants
            .subject_of(grant_id)
            .await?
            .ok_or(AdminError::GrantNotFound { id: grant_id })?;
        let revoker = self.require_subject(revoked_by).await?;

        self.append_grant(&subject_id, |log| {
            let grant = log
                .find(grant_id)
                .filter(|_| !log.is_revoked(grant_id))
                .ok_or(AdminError::GrantNotFound { id: grant_id })?;
            self.check_ceiling(&revoker, self.implied_role(grant))?;
            Ok(GrantRecord::Revoked(Revocation {
                target: grant_id,
                revoked_by: revoker.id.clone(),
                revoked_at: OffsetDateTime::now_utc(),
                reason: reason.to_string(),
            }))
        })
        .await?;

        tracing::info!(
            grant_id = %grant_id,
            subject = %subject_id,
            revoked_by = %revoker.id,
            "Grant revoked"
        );
        Ok(())
    }

    /// Returns a subject's full grant history, including revocations.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant store cannot be read.
    pub async fn history(&self, subject_id: &str) -> AuthResult<Vec<GrantRecord>> {
        Ok(self.stores.grants.load(subject_id).await?.records)
    }

    // =========================================================================
    // Delegations
    // =========================================================================

    /// Lets `delegate_id` act with `delegator_id`'s authority during `window`.
    ///
    /// # Errors
    ///
    /// - `INVALID_DELEGATION` for an empty window or self-delegation
    /// - `SUBJECT_NOT_FOUND` if any party is unknown
    /// - `GRANT_ESCALATION_REJECTED` if the grantor is neither the delegator nor
    ///   ranked at least as high
    /// - `DELEGATION_CONFLICT` if the window overlaps an unrevoked delegation
    ///   of the same pair
    pub async fn delegate(
        &self,
        delegator_id: &str,
        delegate_id: &str,
        window: ValidityWindow,
        granted_by: &str,
        reason: &str,
    ) -> AuthResult<Delegation> {
        if delegator_id == delegate_id {
            return Err(AdminError::invalid_delegation("a subject cannot delegate to itself").into());
        }
        if window.is_empty() {
            return Err(AdminError::invalid_delegation(format!(
                "window [{}, {}) is empty",
                window.start, window.end
            ))
            .into());
        }

        let delegator = self.require_subject(delegator_id).await?;
        self.require_subject(delegate_id).await?;
        let grantor = if granted_by == delegator_id {
            delegator.clone()
        } else {
            self.require_subject(granted_by).await?
        };
        if grantor.id != delegator.id {
            self.check_ceiling(&grantor, delegator.role)?;
        }

        let delegation = Delegation {
            id: Uuid::new_v4(),
            delegator_id: delegator.id.clone(),
            delegate_id: delegate_id.to_string(),
            window,
            granted_by: grantor.id.clone(),
            granted_at: OffsetDateTime::now_utc(),
            reason: reason.to_string(),
        };
        self.append_delegation(delegate_id, |log| {
            if let Some(existing) = log.conflicting(delegator_id, &window) {
                tracing::warn!(
                    delegator = %delegator_id,
                    delegate = %delegate_id,
                    existing = %existing.id,
                    "Delegation window overlaps existing delegation"
                );
                return Err(AdminError::DelegationConflict {
                    existing: existing.id,
                }
                .into());
            }
            Ok(DelegationRecord::Delegated(delegation.clone()))
        })
        .await?;

        tracing::info!(
            delegation_id = %delegation.id,
            delegator = %delegator_id,
            delegate = %delegate_id,
            start = %window.start,
            end = %window.end,
            "Delegation recorded"
        );
        Ok(delegation)
    }

    /// Revokes a delegation by appending a superseding record.
    ///
    /// The delegator, the delegate, and anyone ranked at least as high as the
    /// delegator may revoke.
    ///
    /// # Errors
    ///
    /// - `DELEGATION_NOT_FOUND` if the delegation is unknown or already revoked
    /// - `SUBJECT_NOT_FOUND` if the revoker is unknown
    /// - `GRANT_ESCALATION_REJECTED` if the revoker lacks standing
    pub async fn revoke_delegation(
        &self,
        delegation_id: Uuid,
        revoked_by: &str,
        reason: &str,
    ) -> AuthResult<()> {
        let delegate_id = self
            .stores
            .delegations
            .delegate_of(delegation_id)
            .await?
            .ok_or(AdminError::DelegationNotFound { id: delegation_id })?;
        let revoker = self.require_subject(revoked_by).await?;

        let log = self.stores.delegations.load(&delegate_id).await?;
        let delegator_id = log
            .find(delegation_id)
            .map(|d| d.delegator_id.clone())
            .ok_or(AdminError::DelegationNotFound { id: delegation_id })?;
        if revoker.id != delegator_id && revoker.id != delegate_id {
            let delegator = self.require_subject(&delegator_id).await?;
            self.check_ceiling(&revoker, delegator.role)?;
        }

        self.append_delegation(&delegate_id, |log| {
            if log.find(delegation_id).is_none() || log.is_revoked(delegation_id) {
                return Err(AdminError::DelegationNotFound { id: delegation_id }.into());
            }
            Ok(DelegationRecord::Revoked(Revocation {
                target: delegation_id,
                revoked_by: revoker.id.clone(),
                revoked_at: OffsetDateTime::now_utc(),
                reason: reason.to_string(),
            }))
        })
        .await?;

        tracing::info!(
            delegation_id = %delegation_id,
            delegate = %delegate_id,
            revoked_by = %revoker.id,
            "Delegation revoked"
        );
        Ok(())
    }

    /// Returns a delegate's full delegation history, including revocations.
    ///
    /// # Errors
    ///
    /// Returns an error if the delegation store cannot be read.
    pub async fn delegation_history(&self, delegate_id: &str) -> AuthResult<Vec<DelegationRecord>> {
        Ok(self.stores.delegations.load(delegate_id).await?.records)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn check_expiry(expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> AuthResult<()> {
        match expires_at {
            Some(expiry) if expiry <= now => {
                Err(AdminError::invalid_grant(format!("expiry {expiry} is not in the future")).into())
            }
            _ => Ok(()),
        }
    }

    fn check_ceiling(&self, grantor: &Subject, required: Role) -> AuthResult<()> {
        if self.catalog.hierarchy().is_at_least(grantor.role, required) {
            return Ok(());
        }
        tracing::warn!(
            grantor = %grantor.id,
            grantor_role = %grantor.role,
            required = %required,
            "Grant escalation rejected"
        );
        Err(AdminError::EscalationRejected {
            grantor: grantor.role,
            required,
        }
        .into())
    }

    /// Role a grant confers at most.
    fn implied_role(&self, grant: &Grant) -> Role {
        match &grant.kind {
            GrantKind::ScopedRole { role, .. } => *role,
            GrantKind::Permissions { permissions } => self
                .catalog
                .hierarchy()
                .highest(permissions.iter().map(|p| self.catalog.implied_role(p)))
                .unwrap_or_else(|| self.catalog.hierarchy().top_role()),
        }
    }

    async fn require_subject(&self, id: &str) -> AuthResult<Subject> {
        self.stores
            .subjects
            .find(id)
            .await?
            .ok_or_else(|| AdminError::SubjectNotFound { id: id.to_string() }.into())
    }

    async fn append_grant<F>(&self, subject_id: &str, mut build: F) -> AuthResult<u64>
    where
        F: FnMut(&GrantLog) -> AuthResult<GrantRecord>,
    {
        let mut attempt = 0;
        loop {
            let log = self.stores.grants.load(subject_id).await?;
            let record = build(&log)?;
            match self
                .stores
                .grants
                .append(subject_id, log.version, record)
                .await
            {
                Err(e) if e.is_version_conflict() && attempt < self.config.max_write_retries => {
                    attempt += 1;
                    tracing::debug!(subject = %subject_id, attempt, "Grant log moved, retrying");
                }
                result => return result,
            }
        }
    }

    async fn append_delegation<F>(&self, delegate_id: &str, mut build: F) -> AuthResult<u64>
    where
        F: FnMut(&DelegationLog) -> AuthResult<DelegationRecord>,
    {
        let mut attempt = 0;
        loop {
            let log = self.stores.delegations.load(delegate_id).await?;
            let record = build(&log)?;
            match self
                .stores
                .delegations
                .append(delegate_id, log.version, record)
                .await
            {
                Err(e) if e.is_version_conflict() && attempt < self.config.max_write_retries => {
                    attempt += 1;
                    tracing::debug!(delegate = %delegate_id, attempt, "Delegation log moved, retrying");
                }
                result => return result,
            }
        }
    }
}

impl std::fmt::Debug for GrantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
