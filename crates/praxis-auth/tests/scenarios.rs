//! End-to-end authorization scenarios against the in-memory stores.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use praxis_auth::audit::AuditEntry;
use praxis_auth::config::{EvaluatorConfig, StorageConfig};
use praxis_auth::prelude::*;
use praxis_auth::storage::GrantLog;
use praxis_auth::{
    AuditRecorder, BusinessHours, GrantStorage, InMemoryAuditLog, InMemoryResourceLoader,
    InMemorySubjectStorage, IpAllowList, SubjectStorage,
};

/// A Friday morning.
const WEEKDAY: OffsetDateTime = datetime!(2026-05-08 10:00 UTC);
/// The following Saturday morning.
const SATURDAY: OffsetDateTime = datetime!(2026-05-09 10:00 UTC);

fn root() -> Subject {
    Subject::new("root", Role::Superadmin)
}
fn admin() -> Subject {
    Subject::new("admin-1", Role::Admin)
}
fn arzt() -> Subject {
    Subject::new("arzt-a", Role::Arzt)
}
fn assistent() -> Subject {
    Subject::new("assistent-b", Role::Assistent)
}
fn rezeption() -> Subject {
    Subject::new("rezeption-1", Role::Rezeption)
}
fn patient() -> Subject {
    Subject::new("patient-p", Role::Patient)
}

fn all_subjects() -> Vec<Subject> {
    vec![root(), admin(), arzt(), assistent(), rezeption(), patient()]
}

fn resources() -> Vec<ResourceInstance> {
    vec![
        ResourceInstance::new(ResourceType::Patient, "patient-p").with_owner("patient-p"),
        ResourceInstance::new(ResourceType::Patient, "patient-q").with_owner("patient-q"),
        ResourceInstance::new(ResourceType::Document, "doc-psych")
            .with_owner("patient-p")
            .with_confidentiality(Confidentiality::HighlySensitive),
        ResourceInstance::new(ResourceType::Treatment, "tx-berlin").with_location("berlin"),
        ResourceInstance::new(ResourceType::Treatment, "tx-hamburg").with_location("hamburg"),
    ]
}

struct Harness {
    evaluator: PolicyEvaluator,
    admin: GrantService,
    audit: Arc<InMemoryAuditLog>,
}

impl Harness {
    fn new() -> Self {
        Self::build(
            EvaluatorConfig::default(),
            Arc::new(resources().into_iter().collect::<InMemoryResourceLoader>()),
            AuthzStores::new(
                Arc::new(praxis_auth::InMemoryGrantStorage::new()),
                Arc::new(praxis_auth::InMemoryDelegationStorage::new()),
                Arc::new(InMemorySubjectStorage::with_subjects(all_subjects())),
            ),
        )
    }

    fn build(
        config: EvaluatorConfig,
        loader: Arc<dyn ResourceLoader>,
        stores: AuthzStores,
    ) -> Self {
        let catalog = Arc::new(PermissionCatalog::default());
        let audit = Arc::new(InMemoryAuditLog::new());
        let evaluator = PolicyEvaluator::new(
            Arc::clone(&catalog),
            config,
            stores.clone(),
            loader,
            audit.clone(),
        );
        let admin = GrantService::new(catalog, stores, StorageConfig::default());
        Self {
            evaluator,
            admin,
            audit,
        }
    }

    async fn authorize(&self, request: AuthorizeRequest) -> Decision {
        self.evaluator.authorize(request).await.unwrap()
    }
}

fn request(subject: &Subject, action: Action, resource_type: ResourceType) -> AuthorizeRequest {
    AuthorizeRequest::new(Some(subject.clone()), action, resource_type)
        .with_context(EvaluationContext::new(WEEKDAY))
}

// =============================================================================
// Role bypass
// =============================================================================

#[tokio::test]
async fn top_role_always_allows_with_one_audit_entry_each() {
    let harness = Harness::new();
    let mut expected = 0;

    for resource_type in ResourceType::ALL {
        for action in Action::ALL {
            let decision = harness
                .authorize(request(&root(), action, resource_type).with_id("does-not-exist"))
                .await;
            expected += 1;

            assert!(decision.allowed);
            assert_eq!(decision.reason, ReasonCode::RoleBypass);
            assert_eq!(harness.audit.len().await, expected);
        }
    }
}

#[tokio::test]
async fn top_role_bypass_skips_resource_loading() {
    let harness = Harness::build(
        EvaluatorConfig::default(),
        Arc::new(FailingLoader),
        AuthzStores::in_memory(),
    );

    let decision = harness
        .authorize(request(&root(), Action::Delete, ResourceType::Patient).with_id("p-1"))
        .await;
    assert_eq!(decision.reason, ReasonCode::RoleBypass);
    assert!(decision.subject_summary.is_none());
}

// =============================================================================
// Self-service
// =============================================================================

#[tokio::test]
async fn patient_reads_own_record() {
    let harness = Harness::new();
    let decision = harness
        .authorize(request(&patient(), Action::Read, ResourceType::Patient).with_id("patient-p"))
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.reason, ReasonCode::Granted);
    assert_eq!(decision.matched_rule, Rule::SelfService);
}

#[tokio::test]
async fn patient_cannot_read_other_record() {
    let harness = Harness::new();
    let decision = harness
        .authorize(request(&patient(), Action::Read, ResourceType::Patient).with_id("patient-q"))
        .await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, ReasonCode::InsufficientPermission);
    assert_eq!(decision.required_permission, "patient:read");

    let summary = decision.subject_summary.unwrap();
    assert_eq!(summary.role, Role::Patient);
    assert!(summary.grants.is_empty());
    assert!(summary.scoped_roles.is_empty());
}

#[tokio::test]
async fn self_service_does_not_cover_writes() {
    let harness = Harness::new();
    let decision = harness
        .authorize(
            request(&patient(), Action::Update, ResourceType::Patient).with_id("patient-p"),
        )
        .await;
    assert_eq!(decision.reason, ReasonCode::InsufficientPermission);
}

// =============================================================================
// Contextual constraints
// =============================================================================

#[tokio::test]
async fn business_hours_deny_on_saturday_despite_role_default() {
    let harness = Harness::new();
    let constraints = ConstraintSet::new().with_business_hours(BusinessHours::default());

    let saturday = harness
        .authorize(
            request(&assistent(), Action::Read, ResourceType::Appointment).with_context(
                EvaluationContext::new(SATURDAY).with_constraints(constraints.clone()),
            ),
        )
        .await;
    assert!(!saturday.allowed);
    assert_eq!(saturday.reason, ReasonCode::ContextRestricted);

    let friday = harness
        .authorize(
            request(&assistent(), Action::Read, ResourceType::Appointment)
                .with_context(EvaluationContext::new(WEEKDAY).with_constraints(constraints)),
        )
        .await;
    assert!(friday.allowed);
}

#[tokio::test]
async fn constraints_apply_even_to_top_role() {
    let harness = Harness::new();
    let context = EvaluationContext::new(WEEKDAY).with_constraints(
        ConstraintSet::new().with_ip_allow_list(IpAllowList::parse(["10.0.0.0/8"]).unwrap()),
    );

    let outside = harness
        .authorize(
            request(&root(), Action::Read, ResourceType::Settings)
                .with_context(context.clone().with_source_ip("203.0.113.9".parse().unwrap())),
        )
        .await;
    assert_eq!(outside.reason, ReasonCode::ContextRestricted);

    let inside = harness
        .authorize(
            request(&root(), Action::Read, ResourceType::Settings)
                .with_context(context.with_source_ip("10.4.4.4".parse().unwrap())),
        )
        .await;
    assert_eq!(inside.reason, ReasonCode::RoleBypass);
}

#[tokio::test]
async fn export_requires_consent() {
    let harness = Harness::new();

    let without = harness
        .authorize(request(&arzt(), Action::Export, ResourceType::Patient).with_id("patient-p"))
        .await;
    assert_eq!(without.reason, ReasonCode::ContextRestricted);
    assert_eq!(without.matched_rule, Rule::ConsentGate);

    let with = harness
        .authorize(
            request(&arzt().with_consent(true), Action::Export, ResourceType::Patient)
                .with_id("patient-p"),
        )
        .await;
    assert!(with.allowed);
}

// =============================================================================
// Authentication and resolution
// =============================================================================

#[tokio::test]
async fn anonymous_requests_are_unauthenticated() {
    let harness = Harness::new();
    let decision = harness
        .authorize(
            AuthorizeRequest::new(None, Action::Read, ResourceType::Appointment)
                .with_context(EvaluationContext::new(WEEKDAY)),
        )
        .await;

    assert_eq!(decision.reason, ReasonCode::Unauthenticated);
    assert!(decision.subject_summary.is_none());
    assert_eq!(harness.audit.len().await, 1);
}

#[tokio::test]
async fn missing_instance_is_not_found() {
    let harness = Harness::new();
    let decision = harness
        .authorize(request(&arzt(), Action::Read, ResourceType::Patient).with_id("nobody"))
        .await;

    assert_eq!(decision.reason, ReasonCode::ResourceNotFound);
    assert!(decision.subject_summary.is_some());
}

#[tokio::test]
async fn preloaded_instance_is_not_reloaded() {
    let harness = Harness::build(
        EvaluatorConfig::default(),
        Arc::new(FailingLoader),
        AuthzStores::new(
            Arc::new(praxis_auth::InMemoryGrantStorage::new()),
            Arc::new(praxis_auth::InMemoryDelegationStorage::new()),
            Arc::new(InMemorySubjectStorage::with_subjects(all_subjects())),
        ),
    );

    let instance = ResourceInstance::new(ResourceType::Patient, "patient-p").with_owner("patient-p");
    let decision = harness
        .authorize(request(&patient(), Action::Read, ResourceType::Patient).with_instance(instance))
        .await;
    assert_eq!(decision.matched_rule, Rule::SelfService);
}

// =============================================================================
// Grants
// =============================================================================

#[tokio::test]
async fn identical_requests_yield_identical_decisions() {
    let harness = Harness::new();
    let make = || request(&rezeption(), Action::Update, ResourceType::Patient).with_id("patient-q");

    let first = harness.authorize(make()).await;
    let second = harness.authorize(make()).await;

    assert_ne!(first.audit_id, second.audit_id);
    assert_eq!(
        Decision {
            audit_id: second.audit_id,
            ..first
        },
        second
    );
}

#[tokio::test]
async fn revoking_a_grant_restores_the_previous_decision() {
    let harness = Harness::new();
    let make = || request(&rezeption(), Action::Update, ResourceType::Patient).with_id("patient-q");

    let before = harness.authorize(make()).await;
    assert_eq!(before.reason, ReasonCode::InsufficientPermission);

    let grant = harness
        .admin
        .grant(
            "rezeption-1",
            ResourcePattern::Exact(ResourceType::Patient),
            &[ActionPattern::Exact(Action::Update)],
            "admin-1",
            "address changes",
            None,
        )
        .await
        .unwrap();

    let during = harness.authorize(make()).await;
    assert!(during.allowed);
    assert!(matches!(during.matched_rule, Rule::CustomGrant { grant_id, .. } if grant_id == grant.id));

    harness
        .admin
        .revoke(grant.id, "admin-1", "done")
        .await
        .unwrap();

    let after = harness.authorize(make()).await;
    assert_eq!(
        Decision {
            audit_id: before.audit_id,
            ..after
        },
        before
    );
}

#[tokio::test]
async fn expired_grants_do_not_apply() {
    let harness = Harness::new();
    let expiry = OffsetDateTime::now_utc() + Duration::hours(1);
    harness
        .admin
        .grant(
            "rezeption-1",
            ResourcePattern::Exact(ResourceType::Invoice),
            &[ActionPattern::Exact(Action::Create)],
            "admin-1",
            "month end",
            Some(expiry),
        )
        .await
        .unwrap();

    let before_expiry = harness
        .authorize(
            request(&rezeption(), Action::Create, ResourceType::Invoice)
                .with_context(EvaluationContext::new(expiry - Duration::minutes(1))),
        )
        .await;
    assert!(before_expiry.allowed);

    let after_expiry = harness
        .authorize(
            request(&rezeption(), Action::Create, ResourceType::Invoice)
                .with_context(EvaluationContext::new(expiry)),
        )
        .await;
    assert!(!after_expiry.allowed);
    assert!(after_expiry.subject_summary.unwrap().grants.is_empty());
}

#[tokio::test]
async fn sensitivity_ceiling_beats_custom_grant() {
    let harness = Harness::new();
    harness
        .admin
        .grant(
            "rezeption-1",
            ResourcePattern::Exact(ResourceType::Document),
            &[ActionPattern::Exact(Action::Read)],
            "admin-1",
            "scanning",
            None,
        )
        .await
        .unwrap();

    let decision = harness
        .authorize(request(&rezeption(), Action::Read, ResourceType::Document).with_id("doc-psych"))
        .await;
    assert!(!decision.allowed);
    assert_eq!(decision.reason, ReasonCode::SensitivityExceeded);
    assert_eq!(
        decision.subject_summary.unwrap().grants,
        vec!["document:read".parse::<PermissionPattern>().unwrap()]
    );

    let doctor = harness
        .authorize(request(&arzt(), Action::Read, ResourceType::Document).with_id("doc-psych"))
        .await;
    assert!(doctor.allowed);
}

#[tokio::test]
async fn escalating_grants_are_rejected_for_every_grantor() {
    let harness = Harness::new();
    let catalog = harness.evaluator.catalog();
    let grantors = [admin(), arzt(), assistent(), rezeption()];
    let patterns = ["patient:read", "treatment:create", "settings:*", "*:*", "user:read"];

    for grantor in &grantors {
        for raw in patterns {
            let pattern: PermissionPattern = raw.parse().unwrap();
            let before = harness.admin.history("patient-p").await.unwrap().len();

            let result = harness
                .admin
                .grant(
                    "patient-p",
                    pattern.resource,
                    &[pattern.action],
                    &grantor.id,
                    "property",
                    None,
                )
                .await;
            let after = harness.admin.history("patient-p").await.unwrap().len();

            let allowed = catalog
                .hierarchy()
                .is_at_least(grantor.role, catalog.implied_role(&pattern));
            match result {
                Ok(_) => {
                    assert!(allowed, "{} granted {raw}", grantor.role);
                    assert_eq!(after, before + 1);
                }
                Err(err) => {
                    assert!(!allowed, "{} was refused {raw}", grantor.role);
                    assert_eq!(err.as_admin().map(AdminError::code), Some("GRANT_ESCALATION_REJECTED"));
                    assert_eq!(after, before);
                }
            }
        }
    }
}

#[tokio::test]
async fn admin_cannot_grant_top_rank_wildcard() {
    let harness = Harness::new();
    let err = harness
        .admin
        .grant(
            "rezeption-1",
            ResourcePattern::Any,
            &[ActionPattern::Any],
            "admin-1",
            "make me root",
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.as_admin().map(AdminError::code), Some("GRANT_ESCALATION_REJECTED"));
}

#[tokio::test]
async fn scoped_role_applies_only_within_location() {
    let harness = Harness::new();
    harness
        .admin
        .grant_scoped_role(
            "assistent-b",
            Role::Arzt,
            RoleScope::Location {
                id: "berlin".to_string(),
            },
            "admin-1",
            "locum in Berlin",
            None,
        )
        .await
        .unwrap();

    let berlin = harness
        .authorize(request(&assistent(), Action::Create, ResourceType::Treatment).with_id("tx-berlin"))
        .await;
    assert!(matches!(berlin.matched_rule, Rule::ScopedRole { role: Role::Arzt, .. }));

    let hamburg = harness
        .authorize(
            request(&assistent(), Action::Create, ResourceType::Treatment).with_id("tx-hamburg"),
        )
        .await;
    assert_eq!(hamburg.reason, ReasonCode::InsufficientPermission);
    assert_eq!(
        hamburg.subject_summary.unwrap().scoped_roles,
        vec!["arzt@location/berlin".to_string()]
    );
}

// =============================================================================
// Delegation
// =============================================================================

#[tokio::test]
async fn delegation_lends_authority_within_window_only() {
    let harness = Harness::new();
    let t0 = datetime!(2026-06-01 0:00 UTC);
    let t1 = datetime!(2026-06-15 0:00 UTC);
    let delegation = harness
        .admin
        .delegate(
            "arzt-a",
            "assistent-b",
            ValidityWindow::new(t0, t1),
            "arzt-a",
            "vacation cover",
        )
        .await
        .unwrap();

    let inside = harness
        .authorize(
            request(&assistent(), Action::Create, ResourceType::Treatment)
                .with_context(EvaluationContext::new(t0 + Duration::hours(1))),
        )
        .await;
    assert!(inside.allowed);
    match &inside.matched_rule {
        Rule::Delegation {
            delegation_id,
            delegator_id,
            via,
        } => {
            assert_eq!(*delegation_id, delegation.id);
            assert_eq!(delegator_id, "arzt-a");
            assert_eq!(**via, Rule::RoleDefault { role: Role::Arzt });
        }
        other => panic!("unexpected rule {other:?}"),
    }

    let after = harness
        .authorize(
            request(&assistent(), Action::Create, ResourceType::Treatment)
                .with_context(EvaluationContext::new(t1 + Duration::hours(1))),
        )
        .await;
    assert_eq!(after.reason, ReasonCode::InsufficientPermission);

    let entries = harness.audit.entries().await;
    assert_eq!(entries[0].acting_for.as_deref(), Some("arzt-a"));
    assert_eq!(entries[1].acting_for, None);
}

#[tokio::test]
async fn delegation_clears_ceiling_with_delegator_role() {
    let harness = Harness::new();
    let t0 = datetime!(2026-06-01 0:00 UTC);
    harness
        .admin
        .delegate(
            "arzt-a",
            "assistent-b",
            ValidityWindow::new(t0, t0 + Duration::days(14)),
            "arzt-a",
            "vacation cover",
        )
        .await
        .unwrap();

    let own_only = harness
        .authorize(request(&assistent(), Action::Read, ResourceType::Document).with_id("doc-psych"))
        .await;
    assert_eq!(own_only.reason, ReasonCode::SensitivityExceeded);

    let delegated = harness
        .authorize(
            request(&assistent(), Action::Read, ResourceType::Document)
                .with_id("doc-psych")
                .with_context(EvaluationContext::new(t0 + Duration::days(1))),
        )
        .await;
    assert!(delegated.allowed);
    assert!(matches!(delegated.matched_rule, Rule::Delegation { .. }));
}

#[tokio::test]
async fn delegation_does_not_chain() {
    let harness = Harness::new();
    let t0 = datetime!(2026-06-01 0:00 UTC);
    let window = ValidityWindow::new(t0, t0 + Duration::days(14));
    harness
        .admin
        .delegate("arzt-a", "assistent-b", window, "arzt-a", "cover")
        .await
        .unwrap();
    harness
        .admin
        .delegate("admin-1", "arzt-a", window, "admin-1", "cover the cover")
        .await
        .unwrap();

    let decision = harness
        .authorize(
            request(&assistent(), Action::Read, ResourceType::User)
                .with_context(EvaluationContext::new(t0 + Duration::days(1))),
        )
        .await;
    assert_eq!(decision.reason, ReasonCode::InsufficientPermission);

    let summary = decision.subject_summary.unwrap();
    assert_eq!(summary.role, Role::Assistent);
    assert!(summary.grants.is_empty());
}

// =============================================================================
// Failure handling
// =============================================================================

struct FailingLoader;

#[async_trait]
impl ResourceLoader for FailingLoader {
    async fn load(
        &self,
        _resource_type: ResourceType,
        _id: &str,
    ) -> AuthResult<Option<ResourceInstance>> {
        Err(AuthError::loader("connection refused"))
    }
}

struct SlowLoader;

#[async_trait]
impl ResourceLoader for SlowLoader {
    async fn load(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> AuthResult<Option<ResourceInstance>> {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
        Ok(Some(ResourceInstance::new(resource_type, id)))
    }
}

fn slow_harness(config: EvaluatorConfig) -> Harness {
    Harness::build(
        EvaluatorConfig {
            loader_timeout: StdDuration::from_millis(20),
            ..config
        },
        Arc::new(SlowLoader),
        AuthzStores::in_memory(),
    )
}

#[tokio::test]
async fn loader_timeout_fails_closed_with_error_entry() {
    let harness = slow_harness(EvaluatorConfig::default());

    let err = harness
        .evaluator
        .authorize(request(&arzt(), Action::Read, ResourceType::Patient).with_id("p-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::LoaderTimeout { .. }));
    assert!(err.is_server_error());

    let entries = harness.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, AuditOutcome::Error);
    assert!(!entries[0].allowed);
    assert_eq!(entries[0].resource_id.as_deref(), Some("p-1"));
}

#[tokio::test]
async fn loader_timeout_fails_open_to_role_default() {
    let harness = slow_harness(
        EvaluatorConfig::default().with_failure_mode(Action::Read, FailureMode::FailOpen),
    );

    let allowed = harness
        .evaluator
        .authorize(request(&arzt(), Action::Read, ResourceType::Patient).with_id("p-1"))
        .await
        .unwrap();
    assert!(allowed.allowed);
    assert!(allowed.degraded);
    assert_eq!(allowed.matched_rule, Rule::RoleDefault { role: Role::Arzt });

    let denied = harness
        .evaluator
        .authorize(request(&patient(), Action::Read, ResourceType::Patient).with_id("patient-p"))
        .await
        .unwrap();
    assert!(!denied.allowed);
    assert!(denied.degraded);

    let entries = harness.audit.entries().await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.degraded));

    // Other actions still fail closed.
    assert!(
        harness
            .evaluator
            .authorize(request(&arzt(), Action::Update, ResourceType::Patient).with_id("p-1"))
            .await
            .is_err()
    );
}

struct FailingGrantStorage;

#[async_trait]
impl GrantStorage for FailingGrantStorage {
    async fn load(&self, _subject_id: &str) -> AuthResult<GrantLog> {
        Err(AuthError::storage("grant store unavailable"))
    }

    async fn append(
        &self,
        _subject_id: &str,
        _expected_version: u64,
        _record: praxis_auth::storage::GrantRecord,
    ) -> AuthResult<u64> {
        Err(AuthError::storage("grant store unavailable"))
    }

    async fn subject_of(&self, _grant_id: uuid::Uuid) -> AuthResult<Option<String>> {
        Err(AuthError::storage("grant store unavailable"))
    }
}

#[tokio::test]
async fn grant_store_fault_fails_closed() {
    let harness = Harness::build(
        EvaluatorConfig::default(),
        Arc::new(InMemoryResourceLoader::new()),
        AuthzStores::new(
            Arc::new(FailingGrantStorage),
            Arc::new(praxis_auth::InMemoryDelegationStorage::new()),
            Arc::new(InMemorySubjectStorage::new()),
        ),
    );

    let err = harness
        .evaluator
        .authorize(request(&rezeption(), Action::Read, ResourceType::Appointment))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Storage { .. }));
    assert_eq!(harness.audit.len().await, 1);

    let has = harness
        .evaluator
        .has_permission(&rezeption(), &"appointment:read".parse().unwrap())
        .await;
    assert!(has.is_err());
}

fn unreachable_grants(config: EvaluatorConfig) -> Harness {
    Harness::build(
        config,
        Arc::new(resources().into_iter().collect::<InMemoryResourceLoader>()),
        AuthzStores::new(
            Arc::new(FailingGrantStorage),
            Arc::new(praxis_auth::InMemoryDelegationStorage::new()),
            Arc::new(InMemorySubjectStorage::with_subjects(all_subjects())),
        ),
    )
}

#[tokio::test]
async fn fail_open_keeps_ceiling_of_loaded_instance() {
    let harness = unreachable_grants(
        EvaluatorConfig::default().with_failure_mode(Action::Read, FailureMode::FailOpen),
    );

    let decision = harness
        .authorize(request(&assistent(), Action::Read, ResourceType::Document).with_id("doc-psych"))
        .await;
    assert!(!decision.allowed);
    assert!(decision.degraded);
    assert_eq!(decision.reason, ReasonCode::SensitivityExceeded);

    let doctor = harness
        .authorize(request(&arzt(), Action::Read, ResourceType::Document).with_id("doc-psych"))
        .await;
    assert!(doctor.allowed);
    assert!(doctor.degraded);
}

#[tokio::test]
async fn fail_open_treats_unloaded_instance_as_strictest_tier() {
    let harness = slow_harness(
        EvaluatorConfig::default().with_failure_mode(Action::Read, FailureMode::FailOpen),
    );

    let decision = harness
        .evaluator
        .authorize(request(&assistent(), Action::Read, ResourceType::Document).with_id("doc-1"))
        .await
        .unwrap();
    assert!(decision.degraded);
    assert_eq!(decision.reason, ReasonCode::SensitivityExceeded);
}

#[tokio::test]
async fn early_denials_do_not_need_grant_store() {
    let harness = unreachable_grants(EvaluatorConfig::default());
    let business_hours = ConstraintSet::new().with_business_hours(BusinessHours::default());

    let restricted = harness
        .authorize(
            request(&assistent(), Action::Read, ResourceType::Appointment)
                .with_context(EvaluationContext::new(SATURDAY).with_constraints(business_hours)),
        )
        .await;
    assert_eq!(restricted.reason, ReasonCode::ContextRestricted);
    assert!(!restricted.degraded);
    let summary = restricted.subject_summary.unwrap();
    assert_eq!(summary.role, Role::Assistent);
    assert!(summary.grants.is_empty());

    let missing = harness
        .authorize(request(&arzt(), Action::Read, ResourceType::Patient).with_id("nobody"))
        .await;
    assert_eq!(missing.reason, ReasonCode::ResourceNotFound);

    let entries = harness.audit.entries().await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.outcome == AuditOutcome::Deny));
}

struct BrokenAudit;

#[async_trait]
impl AuditRecorder for BrokenAudit {
    async fn append(&self, _entry: AuditEntry) -> AuthResult<()> {
        Err(AuthError::audit("sink offline"))
    }

    async fn query(&self, _filter: &AuditFilter) -> AuthResult<Vec<AuditEntry>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn unaudited_decisions_are_errors() {
    let evaluator = PolicyEvaluator::new(
        Arc::new(PermissionCatalog::default()),
        EvaluatorConfig::default(),
        AuthzStores::in_memory(),
        Arc::new(InMemoryResourceLoader::new()),
        Arc::new(BrokenAudit),
    );

    let err = evaluator
        .authorize(request(&root(), Action::Read, ResourceType::Settings))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Audit { .. }));
}

// =============================================================================
// Wiring
// =============================================================================

#[tokio::test]
async fn configured_evaluator_audits_through_queue() {
    let config = AuthzConfig::from_toml_str(
        r#"
        [catalog.permissions]
        "invoice:create" = "rezeption"

        [audit]
        queued = true
        batch_size = 2
        "#,
    )
    .unwrap();

    let subjects = InMemorySubjectStorage::new();
    subjects.upsert(rezeption()).await.unwrap();
    let stores = AuthzStores::new(
        Arc::new(praxis_auth::InMemoryGrantStorage::new()),
        Arc::new(praxis_auth::InMemoryDelegationStorage::new()),
        Arc::new(subjects),
    );
    let sink = Arc::new(InMemoryAuditLog::new());
    let evaluator = PolicyEvaluator::from_config(
        &config,
        stores,
        Arc::new(InMemoryResourceLoader::new()),
        sink.clone(),
    )
    .unwrap();

    for _ in 0..5 {
        let decision = evaluator
            .authorize(request(&rezeption(), Action::Create, ResourceType::Invoice))
            .await
            .unwrap();
        assert!(decision.allowed);
    }
    assert_eq!(sink.len().await, 5);

    let found = evaluator
        .audit()
        .query(&AuditFilter::new().subject("rezeption-1").limit(3))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn coarse_permission_checks() {
    let harness = Harness::new();
    let p = |s: &str| s.parse::<PermissionPattern>().unwrap();

    assert!(
        harness
            .evaluator
            .has_permission(&rezeption(), &p("invoice:read"))
            .await
            .unwrap()
    );
    assert!(
        !harness
            .evaluator
            .has_permission(&rezeption(), &p("patient:*"))
            .await
            .unwrap()
    );
    assert!(
        harness
            .evaluator
            .has_any_permission(&rezeption(), &[p("patient:*"), p("appointment:read")])
            .await
            .unwrap()
    );

    harness
        .admin
        .grant(
            "rezeption-1",
            ResourcePattern::Exact(ResourceType::Patient),
            &[ActionPattern::Any],
            "admin-1",
            "front desk lead",
            None,
        )
        .await
        .unwrap();
    assert!(
        harness
            .evaluator
            .has_all_permissions(&rezeption(), &[p("patient:*"), p("appointment:read")])
            .await
            .unwrap()
    );
    assert!(
        harness
            .evaluator
            .has_permission(&root(), &p("*:*"))
            .await
            .unwrap()
    );
}
