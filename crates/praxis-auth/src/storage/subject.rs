//! Subject directory trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Subject;

/// Read access to provisioned subjects.
///
/// The evaluator uses this to resolve delegators and the admin service uses
/// it to look up grantors.
#[async_trait]
pub trait SubjectStorage: Send + Sync {
    /// Finds a subject by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find(&self, id: &str) -> AuthResult<Option<Subject>>;

    /// Creates or replaces a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn upsert(&self, subject: Subject) -> AuthResult<()>;
}
