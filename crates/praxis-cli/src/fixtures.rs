//! JSON fixture files for dry-run evaluation.
//!
//! Grants and delegations are replayed through [`GrantService`], so a
//! fixture that would escalate privileges is rejected the same way an
//! administrator request would be.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use time::OffsetDateTime;

use praxis_auth::prelude::*;
use praxis_auth::{
    InMemoryDelegationStorage, InMemoryGrantStorage, InMemoryResourceLoader,
    InMemorySubjectStorage,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixtures {
    pub subjects: Vec<Subject>,
    pub resources: Vec<ResourceInstance>,
    pub grants: Vec<FixtureGrant>,
    pub delegations: Vec<FixtureDelegation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureGrant {
    pub subject_id: String,
    pub granted_by: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub kind: FixtureGrantKind,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FixtureGrantKind {
    Permissions { permissions: Vec<PermissionPattern> },
    ScopedRole { role: Role, scope: RoleScope },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureDelegation {
    pub delegator_id: String,
    pub delegate_id: String,
    pub window: ValidityWindow,
    pub granted_by: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// Stores and loader populated from a fixture file.
#[derive(Debug)]
pub struct Seeded {
    pub stores: AuthzStores,
    pub loader: Arc<InMemoryResourceLoader>,
    pub subjects: Vec<Subject>,
}

impl Seeded {
    pub fn subject(&self, id: &str) -> Result<Subject> {
        self.subjects
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .with_context(|| format!("subject '{id}' is not in the fixtures"))
    }
}

impl Fixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixtures {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse fixtures {}", path.display()))
    }

    pub async fn seed(self, config: &AuthzConfig) -> Result<Seeded> {
        let stores = AuthzStores::new(
            Arc::new(InMemoryGrantStorage::new()),
            Arc::new(InMemoryDelegationStorage::new()),
            Arc::new(InMemorySubjectStorage::with_subjects(self.subjects.clone())),
        );
        let admin = GrantService::new(
            Arc::new(config.catalog()?),
            stores.clone(),
            config.storage.clone(),
        );

        for grant in self.grants {
            match grant.kind {
                FixtureGrantKind::Permissions { permissions } => {
                    for pattern in permissions {
                        admin
                            .grant(
                                &grant.subject_id,
                                pattern.resource,
                                &[pattern.action],
                                &grant.granted_by,
                                &grant.reason,
                                grant.expires_at,
                            )
                            .await
                            .with_context(|| {
                                format!("grant {pattern} to '{}'", grant.subject_id)
                            })?;
                    }
                }
                FixtureGrantKind::ScopedRole { role, scope } => {
                    admin
                        .grant_scoped_role(
                            &grant.subject_id,
                            role,
                            scope.clone(),
                            &grant.granted_by,
                            &grant.reason,
                            grant.expires_at,
                        )
                        .await
                        .with_context(|| {
                            format!("grant {role}@{scope} to '{}'", grant.subject_id)
                        })?;
                }
            }
        }

        for delegation in self.delegations {
            let granted_by = delegation
                .granted_by
                .as_deref()
                .unwrap_or(&delegation.delegator_id);
            admin
                .delegate(
                    &delegation.delegator_id,
                    &delegation.delegate_id,
                    delegation.window,
                    granted_by,
                    &delegation.reason,
                )
                .await
                .with_context(|| {
                    format!(
                        "delegation from '{}' to '{}'",
                        delegation.delegator_id, delegation.delegate_id
                    )
                })?;
        }

        Ok(Seeded {
            stores,
            loader: Arc::new(self.resources.into_iter().collect()),
            subjects: self.subjects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURES: &str = r#"{
        "subjects": [
            {"id": "admin-1", "role": "admin"},
            {"id": "arzt-a", "role": "arzt"},
            {"id": "assistent-b", "role": "assistent"}
        ],
        "resources": [
            {"id": "tx-1", "resourceType": "treatment", "locationId": "berlin"}
        ],
        "grants": [
            {"subjectId": "assistent-b", "grantedBy": "admin-1", "permissions": ["invoice:delete"]},
            {"subjectId": "assistent-b", "grantedBy": "admin-1", "role": "arzt",
             "scope": {"kind": "location", "id": "berlin"}}
        ],
        "delegations": [
            {"delegatorId": "arzt-a", "delegateId": "assistent-b",
             "window": {"start": "2026-06-01T00:00:00Z", "end": "2026-06-15T00:00:00Z"}}
        ]
    }"#;

    #[tokio::test]
    async fn test_seed_populates_stores() {
        let fixtures: Fixtures = serde_json::from_str(FIXTURES).unwrap();
        let seeded = fixtures.seed(&AuthzConfig::default()).await.unwrap();

        assert_eq!(seeded.loader.len(), 1);
        assert_eq!(seeded.subject("arzt-a").unwrap().role, Role::Arzt);
        assert!(seeded.subject("nobody").is_err());

        let grants = seeded.stores.grants.load("assistent-b").await.unwrap();
        assert_eq!(grants.records.len(), 2);
        let delegations = seeded.stores.delegations.load("assistent-b").await.unwrap();
        assert_eq!(delegations.records.len(), 1);
    }

    #[tokio::test]
    async fn test_demo_fixtures_seed() {
        let fixtures: Fixtures =
            serde_json::from_str(include_str!("../../../demos/practice.json")).unwrap();
        let seeded = fixtures.seed(&AuthzConfig::default()).await.unwrap();
        assert_eq!(seeded.subjects.len(), 6);
        assert_eq!(seeded.loader.len(), 3);
    }

    #[tokio::test]
    async fn test_escalating_fixture_is_rejected() {
        let fixtures: Fixtures = serde_json::from_str(
            r#"{
                "subjects": [{"id": "r-1", "role": "rezeption"}],
                "grants": [{"subjectId": "r-1", "grantedBy": "r-1", "permissions": ["*:*"]}]
            }"#,
        )
        .unwrap();
        let err = fixtures.seed(&AuthzConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("grant *:*"));
    }
}
