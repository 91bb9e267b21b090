//! Authorization error types.
//!
//! Policy denials are not errors: they are returned as a
//! [`Decision`](crate::policy::Decision) with a [`ReasonCode`](crate::policy::ReasonCode).
//! This module covers the two remaining families:
//!
//! - [`AdminError`] - rejected grant, revoke and delegation requests
//! - [`AuthError`] - infrastructure faults (stores, loader, audit sink)

use std::fmt;

use uuid::Uuid;

use crate::rbac::Role;

/// Errors that can occur during authorization and grant administration.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A grant, revoke or delegation request was rejected.
    #[error(transparent)]
    Admin(#[from] AdminError),

    /// An error occurred while storing or retrieving authorization data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// An append was validated against a stale version of the record list.
    #[error("Version conflict for {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Subject (or delegate) whose record list changed.
        key: String,
        /// Version the writer validated against.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The resource loader did not answer within the configured timeout.
    #[error("Resource loader timed out after {timeout_ms}ms loading {resource}")]
    LoaderTimeout {
        /// The `type/id` reference being loaded.
        resource: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The resource loader failed.
    #[error("Resource loader error: {message}")]
    Loader {
        /// Description of the loader failure.
        message: String,
    },

    /// An audit record could not be persisted.
    #[error("Audit error: {message}")]
    Audit {
        /// Description of the audit failure.
        message: String,
    },

    /// The authorization configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(key: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::VersionConflict {
            key: key.into(),
            expected,
            actual,
        }
    }

    /// Creates a new `Loader` error.
    #[must_use]
    pub fn loader(message: impl Into<String>) -> Self {
        Self::Loader {
            message: message.into(),
        }
    }

    /// Creates a new `Audit` error.
    #[must_use]
    pub fn audit(message: impl Into<String>) -> Self {
        Self::Audit {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (the request itself was rejected).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// Returns `true` if this is an infrastructure fault.
    ///
    /// These are the errors subject to an action's declared failure mode.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if a retry after re-reading the store may succeed.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns the administrative rejection, if this is one.
    #[must_use]
    pub fn as_admin(&self) -> Option<&AdminError> {
        match self {
            Self::Admin(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Admin(_) => ErrorCategory::Administration,
            Self::Storage { .. } | Self::VersionConflict { .. } => ErrorCategory::Infrastructure,
            Self::LoaderTimeout { .. } | Self::Loader { .. } => ErrorCategory::ResourceLoading,
            Self::Audit { .. } => ErrorCategory::Audit,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Rejections of administrative requests (grant, revoke, delegate).
///
/// Each variant maps to a stable code returned verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    /// The grantor's own rank is below the rank the grant would imply.
    #[error("Grant escalation rejected: {grantor} cannot grant authority requiring {required}")]
    EscalationRejected {
        /// Primary role of the grantor.
        grantor: Role,
        /// Role implied by the requested grant.
        required: Role,
    },

    /// The delegation window overlaps an existing delegation of the same pair.
    #[error("Delegation conflict: window overlaps delegation {existing}")]
    DelegationConflict {
        /// The delegation already covering part of the window.
        existing: Uuid,
    },

    /// The grant request is malformed.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Why the grant is invalid.
        message: String,
    },

    /// The delegation request is malformed.
    #[error("Invalid delegation: {message}")]
    InvalidDelegation {
        /// Why the delegation is invalid.
        message: String,
    },

    /// No active grant with this id exists.
    #[error("Grant not found: {id}")]
    GrantNotFound {
        /// The requested grant id.
        id: Uuid,
    },

    /// No active delegation with this id exists.
    #[error("Delegation not found: {id}")]
    DelegationNotFound {
        /// The requested delegation id.
        id: Uuid,
    },

    /// The subject the request refers to is not provisioned.
    #[error("Subject not found: {id}")]
    SubjectNotFound {
        /// The requested subject id.
        id: String,
    },
}

impl AdminError {
    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidDelegation` error.
    #[must_use]
    pub fn invalid_delegation(message: impl Into<String>) -> Self {
        Self::InvalidDelegation {
            message: message.into(),
        }
    }

    /// Returns the stable rejection code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EscalationRejected { .. } => "GRANT_ESCALATION_REJECTED",
            Self::DelegationConflict { .. } => "DELEGATION_CONFLICT",
            Self::InvalidGrant { .. } => "INVALID_GRANT",
            Self::InvalidDelegation { .. } => "INVALID_DELEGATION",
            Self::GrantNotFound { .. } => "GRANT_NOT_FOUND",
            Self::DelegationNotFound { .. } => "DELEGATION_NOT_FOUND",
            Self::SubjectNotFound { .. } => "SUBJECT_NOT_FOUND",
        }
    }
}

/// Categories of authorization errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejected administrative requests.
    Administration,
    /// Store errors and write conflicts.
    Infrastructure,
    /// Resource loader failures and timeouts.
    ResourceLoading,
    /// Audit sink failures.
    Audit,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Administration => write!(f, "administration"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::ResourceLoading => write!(f, "resource_loading"),
            Self::Audit => write!(f, "audit"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::storage("connection refused");
        assert_eq!(err.to_string(), "Storage error: connection refused");

        let err = AuthError::LoaderTimeout {
            resource: "patient/42".to_string(),
            timeout_ms: 2000,
        };
        assert_eq!(
            err.to_string(),
            "Resource loader timed out after 2000ms loading patient/42"
        );

        let err: AuthError = AdminError::EscalationRejected {
            grantor: Role::Admin,
            required: Role::Superadmin,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Grant escalation rejected: admin cannot grant authority requiring superadmin"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err: AuthError = AdminError::invalid_grant("no actions").into();
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.as_admin().map(AdminError::code), Some("INVALID_GRANT"));

        let err = AuthError::loader("connection reset");
        assert!(err.is_server_error());
        assert!(err.as_admin().is_none());

        assert!(AuthError::version_conflict("u1", 1, 2).is_version_conflict());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::loader("test").category(),
            ErrorCategory::ResourceLoading
        );
        assert_eq!(AuthError::audit("test").category(), ErrorCategory::Audit);
        assert_eq!(
            AuthError::from(AdminError::DelegationConflict {
                existing: Uuid::nil()
            })
            .category(),
            ErrorCategory::Administration
        );
    }

    #[test]
    fn test_admin_codes() {
        assert_eq!(
            AdminError::EscalationRejected {
                grantor: Role::Admin,
                required: Role::Superadmin
            }
            .code(),
            "GRANT_ESCALATION_REJECTED"
        );
        assert_eq!(
            AdminError::DelegationConflict {
                existing: Uuid::nil()
            }
            .code(),
            "DELEGATION_CONFLICT"
        );
        assert_eq!(
            AdminError::GrantNotFound { id: Uuid::nil() }.code(),
            "GRANT_NOT_FOUND"
        );
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Administration.to_string(), "administration");
        assert_eq!(ErrorCategory::ResourceLoading.to_string(), "resource_loading");
    }
}
