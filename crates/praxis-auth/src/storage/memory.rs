//! In-memory storage backends.
//!
//! Uses `DashMap` for concurrent access. The version check and the push
//! happen under the same shard lock, so two appends against the same log
//! version can never both land.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{
    DelegationLog, DelegationRecord, DelegationStorage, GrantLog, GrantRecord, GrantStorage,
    SubjectStorage,
};
use crate::types::Subject;

// =============================================================================
// Grants
// =============================================================================

/// In-memory grant logs keyed by subject id.
#[derive(Debug, Default)]
pub struct InMemoryGrantStorage {
    logs: DashMap<String, Vec<GrantRecord>>,
    /// grant id -> subject id
    owners: DashMap<Uuid, String>,
}

impl InMemoryGrantStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStorage for InMemoryGrantStorage {
    async fn load(&self, subject_id: &str) -> AuthResult<GrantLog> {
        let records = self
            .logs
            .get(subject_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(GrantLog::new(records))
    }

    async fn append(
        &self,
        subject_id: &str,
        expected_version: u64,
        record: GrantRecord,
    ) -> AuthResult<u64> {
        let mut log = self.logs.entry(subject_id.to_string()).or_default();
        let actual = log.len() as u64;
        if actual != expected_version {
            return Err(AuthError::version_conflict(
                format!("grants/{subject_id}"),
                expected_version,
                actual,
            ));
        }

        if let GrantRecord::Granted(grant) = &record {
            self.owners.insert(grant.id, subject_id.to_string());
        }
        log.push(record);
        Ok(actual + 1)
    }

    async fn subject_of(&self, grant_id: Uuid) -> AuthResult<Option<String>> {
        Ok(self.owners.get(&grant_id).map(|entry| entry.value().clone()))
    }
}

// =============================================================================
// Delegations
// =============================================================================

/// In-memory delegation logs keyed by delegate id.
#[derive(Debug, Default)]
pub struct InMemoryDelegationStorage {
    logs: DashMap<String, Vec<DelegationRecord>>,
    /// delegation id -> delegate id
    delegates: DashMap<Uuid, String>,
}

impl InMemoryDelegationStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelegationStorage for InMemoryDelegationStorage {
    async fn load(&self, delegate_id: &str) -> AuthResult<DelegationLog> {
        let records = self
            .logs
            .get(delegate_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(DelegationLog::new(records))
    }

    async fn append(
        &self,
        delegate_id: &str,
        expected_version: u64,
        record: DelegationRecord,
    ) -> AuthResult<u64> {
        let mut log = self.logs.entry(delegate_id.to_string()).or_default();
        let actual = log.len() as u64;
        if actual != expected_version {
            return Err(AuthError::version_conflict(
                format!("delegations/{delegate_id}"),
                expected_version,
                actual,
            ));
        }

        if let DelegationRecord::Delegated(delegation) = &record {
            self.delegates
                .insert(delegation.id, delegate_id.to_string());
        }
        log.push(record);
        Ok(actual + 1)
    }

    async fn delegate_of(&self, delegation_id: Uuid) -> AuthResult<Option<String>> {
        Ok(self
            .delegates
            .get(&delegation_id)
            .map(|entry| entry.value().clone()))
    }
}

// =============================================================================
// Subjects
// =============================================================================

/// In-memory subject directory.
#[derive(Debug, Default)]
pub struct InMemorySubjectStorage {
    subjects: DashMap<String, Subject>,
}

impl InMemorySubjectStorage {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory pre-populated with `subjects`.
    #[must_use]
    pub fn with_subjects(subjects: impl IntoIterator<Item = Subject>) -> Self {
        let store = Self::new();
        for subject in subjects {
            store.subjects.insert(subject.id.clone(), subject);
        }
        store
    }
}

#[async_trait]
impl SubjectStorage for InMemorySubjectStorage {
    async fn find(&self, id: &str) -> AuthResult<Option<Subject>> {
        Ok(self.subjects.get(id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, subject: Subject) -> AuthResult<()> {
        self.subjects.insert(subject.id.clone(), subject);
        Ok(())
    }
}
