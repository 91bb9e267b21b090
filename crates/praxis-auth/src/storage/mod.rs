//! Storage traits for authorization state.
//!
//! This module defines storage interfaces for:
//!
//! - Custom permission grants and resource-scoped role assignments
//! - Delegations of authority between subjects
//! - Subject provisioning data
//!
//! Grant and delegation stores are append-only record logs. A revocation is a
//! new record that supersedes an earlier one; nothing is ever removed. Every
//! append names the log version it was validated against, so concurrent
//! writers to the same log cannot both succeed on stale reads.
//!
//! # Implementations
//!
//! - [`memory`] - in-memory implementations backed by `dashmap`

pub mod delegation;
pub mod grant;
pub mod memory;
pub mod subject;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use delegation::{Delegation, DelegationLog, DelegationRecord, DelegationStorage, ValidityWindow};
pub use grant::{Grant, GrantKind, GrantLog, GrantRecord, GrantStorage, RoleScope};
pub use memory::{InMemoryDelegationStorage, InMemoryGrantStorage, InMemorySubjectStorage};
pub use subject::SubjectStorage;

/// A record superseding an earlier grant or delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revocation {
    /// Id of the revoked grant or delegation.
    pub target: Uuid,

    /// Subject id of the revoker.
    pub revoked_by: String,

    /// When the revocation was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,

    /// Free-text justification.
    pub reason: String,
}

/// The stores the evaluator and the admin service share.
#[derive(Clone)]
pub struct AuthzStores {
    /// Grant logs, keyed by subject.
    pub grants: Arc<dyn GrantStorage>,
    /// Delegation logs, keyed by delegate.
    pub delegations: Arc<dyn DelegationStorage>,
    /// Subject directory.
    pub subjects: Arc<dyn SubjectStorage>,
}

impl AuthzStores {
    /// Bundles the given stores.
    #[must_use]
    pub fn new(
        grants: Arc<dyn GrantStorage>,
        delegations: Arc<dyn DelegationStorage>,
        subjects: Arc<dyn SubjectStorage>,
    ) -> Self {
        Self {
            grants,
            delegations,
            subjects,
        }
    }

    /// Creates empty in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryGrantStorage::new()),
            Arc::new(InMemoryDelegationStorage::new()),
            Arc::new(InMemorySubjectStorage::new()),
        )
    }
}

impl std::fmt::Debug for AuthzStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzStores").finish_non_exhaustive()
    }
}
