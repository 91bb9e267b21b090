//! Policy evaluation engine for access control decisions.
//!
//! The evaluator composes the role hierarchy, the permission catalog, the
//! grant and delegation stores, the subject directory and the contextual
//! constraints into a single [`PolicyEvaluator::authorize`] call. Every call
//! writes exactly one audit entry before it returns.
//!
//! # Example
//!
//! ```ignore
//! use praxis_auth::policy::{AuthorizeRequest, PolicyEvaluator};
//! use praxis_auth::rbac::{Action, ResourceType};
//!
//! let evaluator = PolicyEvaluator::from_config(&config, stores, loader, audit)?;
//!
//! let request = AuthorizeRequest::new(Some(subject), Action::Read, ResourceType::Patient)
//!     .with_id("p-1042");
//! let decision = evaluator.authorize(request).await?;
//! if decision.is_allowed() {
//!     // Proceed with request
//! }
//! ```

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::audit::{AuditEntry, AuditEntryBuilder, AuditRecorder, QueuedAuditRecorder};
use crate::config::{AuthzConfig, ConfigError, EvaluatorConfig, FailureMode};
use crate::error::AuthError;
use crate::policy::context::{AuthorizeRequest, Target};
use crate::policy::decision::{Decision, ReasonCode, Rule, SubjectSummary};
use crate::policy::loader::ResourceLoader;
use crate::rbac::{PermissionCatalog, PermissionPattern, Role};
use crate::storage::{AuthzStores, GrantKind, GrantLog};
use crate::types::{Confidentiality, ResourceInstance, Subject};

// =============================================================================
// Internal Evaluation State
// =============================================================================

/// Reason and rule before the decision is stamped and audited.
#[derive(Debug, Clone)]
struct Verdict {
    reason: ReasonCode,
    rule: Rule,
}

impl Verdict {
    fn allow(rule: Rule) -> Self {
        Self {
            reason: ReasonCode::Granted,
            rule,
        }
    }

    fn deny(reason: ReasonCode, rule: Rule) -> Self {
        Self { reason, rule }
    }

    fn bypass() -> Self {
        Self {
            reason: ReasonCode::RoleBypass,
            rule: Rule::RoleBypass,
        }
    }

    fn is_allowed(&self) -> bool {
        self.reason.is_allow()
    }
}

/// Outcome of the steps that need no store access.
enum Gate<'a> {
    Decided(Verdict),
    Continue(&'a Subject),
}

struct Evaluation {
    verdict: Verdict,
    summary: Option<SubjectSummary>,
    degraded: bool,
}

// =============================================================================
// Policy Evaluator
// =============================================================================

/// The authorization decision engine.
///
/// Stateless per call; share it via `Arc`.
pub struct PolicyEvaluator {
    catalog: Arc<PermissionCatalog>,
    config: EvaluatorConfig,
    stores: AuthzStores,
    loader: Arc<dyn ResourceLoader>,
    audit: Arc<dyn AuditRecorder>,
}

impl PolicyEvaluator {
    /// Creates an evaluator from explicitly constructed parts.
    #[must_use]
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        config: EvaluatorConfig,
        stores: AuthzStores,
        loader: Arc<dyn ResourceLoader>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            catalog,
            config,
            stores,
            loader,
            audit,
        }
    }

    /// Creates an evaluator from configuration.
    ///
    /// When `audit.queued` is set, `audit` is fronted by a
    /// [`QueuedAuditRecorder`], which must be created inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(
        config: &AuthzConfig,
        stores: AuthzStores,
        loader: Arc<dyn ResourceLoader>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = Arc::new(config.catalog()?);
        let audit: Arc<dyn AuditRecorder> = if config.audit.queued {
            Arc::new(QueuedAuditRecorder::spawn(audit, &config.audit))
        } else {
            audit
        };
        Ok(Self::new(
            catalog,
            config.evaluator.clone(),
            stores,
            loader,
            audit,
        ))
    }

    /// Returns the permission catalog.
    #[must_use]
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Returns the evaluator configuration.
    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Returns the audit recorder decisions are written to.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditRecorder> {
        &self.audit
    }

    /// Decides whether `request` is permitted.
    ///
    /// # Evaluation Order
    ///
    /// 0. Opted-in contextual constraints
    /// 1. Authentication
    /// 2. Top-role bypass
    /// 3. Instance resolution
    /// 4. Resource-scoped roles
    /// 5. Owner self-service
    /// 6. Role default
    /// 7. Custom grants
    /// 8. Active delegations (depth 1)
    ///
    /// Every allow except the bypass then passes the confidentiality ceiling
    /// and the consent gate.
    ///
    /// # Errors
    ///
    /// Returns an error on an infrastructure fault when the action fails
    /// closed, or when the audit entry cannot be written.
    pub async fn authorize(&self, request: AuthorizeRequest) -> AuthResult<Decision> {
        let audit_id = Uuid::new_v4();

        let mut resolved = None;
        let evaluation = match self.evaluate(&request, &mut resolved).await {
            Ok(evaluation) => evaluation,
            Err(fault) => match self.config.failure_mode(request.action) {
                FailureMode::FailClosed => {
                    tracing::error!(
                        audit_id = %audit_id,
                        subject = request.subject.as_ref().map(|s| s.id.as_str()),
                        permission = %request.required_permission(),
                        error = %fault,
                        "Authorization aborted on infrastructure fault"
                    );
                    let entry = self
                        .entry_for(&request, audit_id)
                        .error(fault.to_string())
                        .build();
                    self.audit.append(entry).await?;
                    return Err(fault);
                }
                FailureMode::FailOpen => {
                    tracing::warn!(
                        audit_id = %audit_id,
                        subject = request.subject.as_ref().map(|s| s.id.as_str()),
                        permission = %request.required_permission(),
                        error = %fault,
                        "Infrastructure fault, degrading to role-default evaluation"
                    );
                    self.evaluate_degraded(&request, resolved.as_ref())
                }
            },
        };

        let decision = Decision {
            allowed: evaluation.verdict.is_allowed(),
            reason: evaluation.verdict.reason,
            matched_rule: evaluation.verdict.rule,
            required_permission: request.required_permission(),
            audit_id,
            subject_summary: evaluation.summary,
            degraded: evaluation.degraded,
        };

        let entry = self
            .entry_for(&request, audit_id)
            .decision(&decision)
            .build();
        self.audit.append(entry).await?;

        tracing::debug!(
            audit_id = %audit_id,
            allowed = decision.allowed,
            reason = %decision.reason,
            "Authorization decided"
        );
        Ok(decision)
    }

    // =========================================================================
    // Coarse permission checks
    // =========================================================================

    /// Returns `true` if the subject holds `permission` by role or active grant.
    ///
    /// Instance-unaware and unaudited; fine-grained decisions go through
    /// [`authorize`](Self::authorize).
    ///
    /// # Errors
    ///
    /// Returns an error if the grant store cannot be read.
    pub async fn has_permission(
        &self,
        subject: &Subject,
        permission: &PermissionPattern,
    ) -> AuthResult<bool> {
        let granted = self.granted_patterns(subject).await?;
        Ok(self
            .catalog
            .has_permission(subject.role, &granted, permission))
    }

    /// Returns `true` if the subject holds every permission.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant store cannot be read.
    pub async fn has_all_permissions(
        &self,
        subject: &Subject,
        permissions: &[PermissionPattern],
    ) -> AuthResult<bool> {
        let granted = self.granted_patterns(subject).await?;
        Ok(self
            .catalog
            .has_all_permissions(subject.role, &granted, permissions))
    }

    /// Returns `true` if the subject holds at least one permission.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant store cannot be read.
    pub async fn has_any_permission(
        &self,
        subject: &Subject,
        permissions: &[PermissionPattern],
    ) -> AuthResult<bool> {
        let granted = self.granted_patterns(subject).await?;
        Ok(self
            .catalog
            .has_any_permission(subject.role, &granted, permissions))
    }

    async fn granted_patterns(&self, subject: &Subject) -> AuthResult<Vec<PermissionPattern>> {
        if self.catalog.hierarchy().is_top(subject.role) {
            return Ok(Vec::new());
        }
        let log = self.stores.grants.load(&subject.id).await?;
        Ok(log.active_permissions(OffsetDateTime::now_utc()))
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    async fn evaluate(
        &self,
        request: &AuthorizeRequest,
        resolved: &mut Option<ResourceInstance>,
    ) -> AuthResult<Evaluation> {
        let (verdict, grants) = self.decide(request, resolved).await?;

        // Denials decided before the grant store was read summarize the role only.
        let summary = match &request.subject {
            Some(subject) if !verdict.is_allowed() => {
                Some(self.summarize(subject, grants.as_ref(), request.context.timestamp))
            }
            _ => None,
        };

        Ok(Evaluation {
            verdict,
            summary,
            degraded: false,
        })
    }

    /// Runs the full rule chain. Returns the requester's grant log when it
    /// was read, so a deny summary need not read it again.
    ///
    /// The target instance is stored in `resolved` as soon as it is known, so
    /// a later fault can still be evaluated against its confidentiality.
    async fn decide(
        &self,
        request: &AuthorizeRequest,
        resolved: &mut Option<ResourceInstance>,
    ) -> AuthResult<(Verdict, Option<GrantLog>)> {
        let subject = match self.gate(request) {
            Gate::Decided(verdict) => return Ok((verdict, None)),
            Gate::Continue(subject) => subject,
        };

        let instance = match &request.target {
            Target::Type => None,
            Target::Instance(instance) => Some(instance.clone()),
            Target::Id(id) => match self.load_instance(request, id).await? {
                Some(instance) => Some(instance),
                None => {
                    tracing::debug!(
                        resource_type = %request.resource_type,
                        id = %id,
                        "Target instance not found"
                    );
                    return Ok((
                        Verdict::deny(ReasonCode::ResourceNotFound, Rule::ResourceNotFound),
                        None,
                    ));
                }
            },
        };
        if let Some(instance) = &instance
            && instance.resource_type != request.resource_type
        {
            return Err(AuthError::loader(format!(
                "instance {} does not match requested type {}",
                instance.reference(),
                request.resource_type
            )));
        }
        *resolved = instance;
        let instance = resolved.as_ref();
        let tier = instance.map_or(Confidentiality::Normal, |i| i.confidentiality);

        let grants = self.stores.grants.load(&subject.id).await?;
        let own = self
            .match_rules(&subject.id, subject.role, &grants, request, instance)
            .map(|rule| self.apply_overlays(subject, subject.role, rule, request, tier));

        // The ceiling depends on the effective role, so a delegator may still clear it.
        if let Some(verdict) = &own
            && verdict.reason != ReasonCode::SensitivityExceeded
        {
            return Ok((verdict.clone(), Some(grants)));
        }

        if let Some(delegated) = self.evaluate_delegations(subject, request, instance).await?
            && (delegated.is_allowed() || own.is_none())
        {
            return Ok((delegated, Some(grants)));
        }

        if let Some(verdict) = own {
            return Ok((verdict, Some(grants)));
        }

        tracing::debug!(
            subject = %subject.id,
            permission = %request.required_permission(),
            "No rule matched"
        );
        Ok((
            Verdict::deny(ReasonCode::InsufficientPermission, Rule::NoMatch),
            Some(grants),
        ))
    }

    /// Steps 0 to 2; none of them touch a store.
    fn gate<'a>(&self, request: &'a AuthorizeRequest) -> Gate<'a> {
        let context = &request.context;
        if let Some(constraints) = &context.constraints
            && let Some(kind) = constraints.first_violation(context.timestamp, context.source_ip)
        {
            tracing::debug!(constraint = %kind, "Contextual constraint failed");
            return Gate::Decided(Verdict::deny(
                ReasonCode::ContextRestricted,
                Rule::ContextConstraint { constraint: kind },
            ));
        }

        let Some(subject) = &request.subject else {
            return Gate::Decided(Verdict::deny(
                ReasonCode::Unauthenticated,
                Rule::Unauthenticated,
            ));
        };

        if self.catalog.hierarchy().is_top(subject.role) {
            tracing::info!(
                subject = %subject.id,
                role = %subject.role,
                permission = %request.required_permission(),
                "Top role bypasses authorization checks"
            );
            return Gate::Decided(Verdict::bypass());
        }

        Gate::Continue(subject)
    }

    async fn load_instance(
        &self,
        request: &AuthorizeRequest,
        id: &str,
    ) -> AuthResult<Option<ResourceInstance>> {
        let timeout = self.config.loader_timeout;
        match tokio::time::timeout(timeout, self.loader.load(request.resource_type, id)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::LoaderTimeout {
                resource: format!("{}/{id}", request.resource_type),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Steps 4 to 7 for one principal.
    fn match_rules(
        &self,
        principal_id: &str,
        role: Role,
        grants: &GrantLog,
        request: &AuthorizeRequest,
        instance: Option<&ResourceInstance>,
    ) -> Option<Rule> {
        let now = request.context.timestamp;
        let (resource_type, action) = (request.resource_type, request.action);
        let hierarchy = self.catalog.hierarchy();
        let minimal = self.catalog.minimal_role(resource_type, action);
        let active = grants.active(now);

        if let Some(instance) = instance {
            for grant in &active {
                if let GrantKind::ScopedRole {
                    role: scoped,
                    scope,
                } = &grant.kind
                    && scope.covers(instance)
                    && hierarchy.is_at_least(*scoped, minimal)
                {
                    tracing::debug!(principal = %principal_id, grant_id = %grant.id, %scope, "Scoped role matched");
                    return Some(Rule::ScopedRole {
                        grant_id: grant.id,
                        role: *scoped,
                        scope: scope.clone(),
                    });
                }
            }

            if instance.is_owned_by(principal_id)
                && self.catalog.is_self_service(resource_type, action)
            {
                tracing::debug!(principal = %principal_id, "Self-service matched");
                return Some(Rule::SelfService);
            }
        }

        if hierarchy.is_at_least(role, minimal) {
            tracing::debug!(principal = %principal_id, %role, required = %minimal, "Role default matched");
            return Some(Rule::RoleDefault { role });
        }

        active.iter().find_map(|grant| {
            grant
                .permissions()
                .iter()
                .find(|pattern| pattern.matches(resource_type, action))
                .map(|pattern| {
                    tracing::debug!(principal = %principal_id, grant_id = %grant.id, %pattern, "Custom grant matched");
                    Rule::CustomGrant {
                        grant_id: grant.id,
                        pattern: *pattern,
                    }
                })
        })
    }

    /// Step 8: re-evaluate steps 2 and 4 to 7 as each active delegator.
    ///
    /// Returns the first allow, or else the first overlay denial.
    async fn evaluate_delegations(
        &self,
        subject: &Subject,
        request: &AuthorizeRequest,
        instance: Option<&ResourceInstance>,
    ) -> AuthResult<Option<Verdict>> {
        let log = self.stores.delegations.load(&subject.id).await?;
        let mut active = log.active_at(request.context.timestamp);
        active.sort_by_key(|d| d.window.start);

        let mut first_denial = None;

        for delegation in active {
            let Some(delegator) = self.stores.subjects.find(&delegation.delegator_id).await? else {
                tracing::warn!(
                    delegation_id = %delegation.id,
                    delegator = %delegation.delegator_id,
                    "Delegator not found, skipping delegation"
                );
                continue;
            };

            let via = if self.catalog.hierarchy().is_top(delegator.role) {
                Some(Rule::RoleBypass)
            } else {
                let grants = self.stores.grants.load(&delegator.id).await?;
                self.match_rules(&delegator.id, delegator.role, &grants, request, instance)
            };

            if let Some(via) = via {
                tracing::debug!(
                    subject = %subject.id,
                    delegator = %delegator.id,
                    delegation_id = %delegation.id,
                    "Delegation matched"
                );
                let rule = Rule::Delegation {
                    delegation_id: delegation.id,
                    delegator_id: delegator.id.clone(),
                    via: Box::new(via),
                };
                let tier = instance.map_or(Confidentiality::Normal, |i| i.confidentiality);
                let verdict = self.apply_overlays(subject, delegator.role, rule, request, tier);
                if verdict.is_allowed() {
                    return Ok(Some(verdict));
                }
                first_denial.get_or_insert(verdict);
            }
        }

        Ok(first_denial)
    }

    /// Confidentiality ceiling against `effective_role`, then the consent
    /// gate against the requesting subject.
    fn apply_overlays(
        &self,
        subject: &Subject,
        effective_role: Role,
        rule: Rule,
        request: &AuthorizeRequest,
        tier: Confidentiality,
    ) -> Verdict {
        if let Some(required) = self.catalog.required_clearance(tier)
            && !self.catalog.hierarchy().is_at_least(effective_role, required)
        {
            tracing::debug!(
                subject = %subject.id,
                role = %effective_role,
                tier = %tier,
                required = %required,
                "Confidentiality ceiling denied allow"
            );
            return Verdict::deny(
                ReasonCode::SensitivityExceeded,
                Rule::ConfidentialityCeiling { tier, required },
            );
        }

        if self.catalog.requires_consent(request.action) && !subject.consent {
            tracing::debug!(subject = %subject.id, action = %request.action, "Consent missing");
            return Verdict::deny(ReasonCode::ContextRestricted, Rule::ConsentGate);
        }

        Verdict::allow(rule)
    }

    /// Role-default-only evaluation used when an action fails open.
    ///
    /// Skips grants and delegations. The confidentiality ceiling uses the
    /// instance resolved before the fault; a targeted instance that could not
    /// be resolved is treated as the strictest tier.
    fn evaluate_degraded(
        &self,
        request: &AuthorizeRequest,
        resolved: Option<&ResourceInstance>,
    ) -> Evaluation {
        let verdict = match self.gate(request) {
            Gate::Decided(verdict) => verdict,
            Gate::Continue(subject) => {
                let tier = match (resolved, &request.target) {
                    (Some(instance), _) | (None, Target::Instance(instance)) => {
                        instance.confidentiality
                    }
                    (None, Target::Id(_)) => Confidentiality::HighlySensitive,
                    (None, Target::Type) => Confidentiality::Normal,
                };
                if self.catalog.role_allows(subject.role, request.resource_type, request.action) {
                    self.apply_overlays(
                        subject,
                        subject.role,
                        Rule::RoleDefault { role: subject.role },
                        request,
                        tier,
                    )
                } else {
                    Verdict::deny(ReasonCode::InsufficientPermission, Rule::NoMatch)
                }
            }
        };

        let summary = match &request.subject {
            Some(subject) if !verdict.is_allowed() => {
                Some(self.summarize(subject, None, request.context.timestamp))
            }
            _ => None,
        };

        Evaluation {
            verdict,
            summary,
            degraded: true,
        }
    }

    fn summarize(
        &self,
        subject: &Subject,
        grants: Option<&GrantLog>,
        now: OffsetDateTime,
    ) -> SubjectSummary {
        let (scoped_roles, patterns) = grants
            .map(|log| {
                let scoped: Vec<String> = log
                    .active_scoped_roles(now)
                    .into_iter()
                    .map(|(role, scope)| format!("{role}@{scope}"))
                    .collect();
                (scoped, log.active_permissions(now))
            })
            .unwrap_or_default();

        SubjectSummary {
            role: subject.role,
            scoped_roles,
            grants: patterns,
        }
    }

    fn entry_for(&self, request: &AuthorizeRequest, audit_id: Uuid) -> AuditEntryBuilder {
        AuditEntry::builder(request.action, request.resource_type)
            .audit_id(audit_id)
            .subject(request.subject.as_ref().map(|s| s.id.clone()))
            .resource_id(request.target.id().map(str::to_string))
            .request_id(request.context.request_id.clone())
            .source_ip(request.context.source_ip)
            .timestamp(request.context.timestamp)
    }
}

impl std::fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
