//! Authenticated subjects.

use serde::{Deserialize, Serialize};

use crate::rbac::Role;

/// An authenticated actor requesting access.
///
/// Only provisioning data lives here. Scoped roles, grants and delegations
/// are read from their stores on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Subject id.
    pub id: String,

    /// Primary role.
    pub role: Role,

    /// Whether the subject has consented to consent-gated actions
    /// (e.g. external export).
    #[serde(default)]
    pub consent: bool,

    /// Display name for logs and admin views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Subject {
    /// Creates a subject without consent.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            consent: false,
            display_name: None,
        }
    }

    /// Sets the consent flag.
    #[must_use]
    pub fn with_consent(mut self, consent: bool) -> Self {
        self.consent = consent;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}
