//! Delegation storage trait.
//!
//! A delegation lets one subject act with another subject's authority for a
//! bounded time window. Logs are keyed by the delegate, since evaluation
//! always asks "who may this subject act for right now?".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::storage::Revocation;

/// Half-open validity interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    /// First instant the delegation applies.
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,

    /// First instant the delegation no longer applies.
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl ValidityWindow {
    /// Creates a window. Does not validate ordering.
    #[must_use]
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    /// Returns `true` if the window contains no instant.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns `true` if `at` lies inside the window.
    #[must_use]
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at < self.end
    }

    /// Returns `true` if the two windows share at least one instant.
    ///
    /// Adjacent windows (`[t0, t1)` and `[t1, t2)`) do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &ValidityWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A time-bounded transfer of authority from delegator to delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    /// Delegation id.
    pub id: Uuid,

    /// Subject whose authority is lent.
    pub delegator_id: String,

    /// Subject acting with the delegator's authority.
    pub delegate_id: String,

    /// When the delegation applies.
    pub window: ValidityWindow,

    /// Subject id of whoever recorded the delegation.
    pub granted_by: String,

    /// When the delegation was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,

    /// Free-text justification.
    pub reason: String,
}

/// One entry in a delegate's delegation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum DelegationRecord {
    /// A delegation was recorded.
    Delegated(Delegation),
    /// An earlier delegation was revoked.
    Revoked(Revocation),
}

/// A delegate's full delegation history, as read at one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationLog {
    /// Records in append order.
    pub records: Vec<DelegationRecord>,
    /// Version the log was read at; equals the number of records.
    pub version: u64,
}

impl DelegationLog {
    /// Creates a log from its records.
    #[must_use]
    pub fn new(records: Vec<DelegationRecord>) -> Self {
        let version = records.len() as u64;
        Self { records, version }
    }

    /// Returns `true` if a revocation targets `delegation_id`.
    #[must_use]
    pub fn is_revoked(&self, delegation_id: Uuid) -> bool {
        self.records
            .iter()
            .any(|r| matches!(r, DelegationRecord::Revoked(rev) if rev.target == delegation_id))
    }

    /// Finds a delegation by id, revoked or not.
    #[must_use]
    pub fn find(&self, delegation_id: Uuid) -> Option<&Delegation> {
        self.records.iter().find_map(|r| match r {
            DelegationRecord::Delegated(d) if d.id == delegation_id => Some(d),
            _ => None,
        })
    }

    /// Returns every unrevoked delegation, regardless of window.
    #[must_use]
    pub fn unrevoked(&self) -> Vec<&Delegation> {
        self.records
            .iter()
            .filter_map(|r| match r {
                DelegationRecord::Delegated(d) if !self.is_revoked(d.id) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Returns unrevoked delegations whose window contains `at`.
    #[must_use]
    pub fn active_at(&self, at: OffsetDateTime) -> Vec<&Delegation> {
        self.unrevoked()
            .into_iter()
            .filter(|d| d.window.contains(at))
            .collect()
    }

    /// Finds an unrevoked delegation from `delegator_id` overlapping `window`.
    #[must_use]
    pub fn conflicting(&self, delegator_id: &str, window: &ValidityWindow) -> Option<&Delegation> {
        self.unrevoked()
            .into_iter()
            .find(|d| d.delegator_id == delegator_id && d.window.overlaps(window))
    }
}

/// Storage operations for delegation logs, keyed by delegate.
#[async_trait]
pub trait DelegationStorage: Send + Sync {
    /// Loads a delegate's log. Unknown delegates have an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn load(&self, delegate_id: &str) -> AuthResult<DelegationLog>;

    /// Appends a record if the log is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::VersionConflict` if the log moved on, or a storage
    /// error if the write fails.
    async fn append(
        &self,
        delegate_id: &str,
        expected_version: u64,
        record: DelegationRecord,
    ) -> AuthResult<u64>;

    /// Returns the delegate a delegation was recorded for.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delegate_of(&self, delegation_id: Uuid) -> AuthResult<Option<String>>;
}
