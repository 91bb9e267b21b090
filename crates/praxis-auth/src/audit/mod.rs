//! Audit trail for authorization decisions.
//!
//! Every `authorize` call produces exactly one [`AuditEntry`], whether it
//! allowed, denied, or aborted on an infrastructure fault. Entries are
//! immutable and the log is append-only.
//!
//! - [`InMemoryAuditLog`] - durable-enough sink for tests and tooling
//! - [`QueuedAuditRecorder`] - worker-backed front for any sink

pub mod queue;

use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::AuthResult;
use crate::policy::{Decision, ReasonCode, Rule};
use crate::rbac::{Action, ResourceType};

pub use queue::QueuedAuditRecorder;

// =============================================================================
// Audit Entry
// =============================================================================

/// Outcome recorded for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Access granted.
    Allow,
    /// Access denied.
    Deny,
    /// Evaluation aborted on an infrastructure fault.
    Error,
}

impl AuditOutcome {
    /// Returns the outcome name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Error => "error",
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Entry id; equals the decision's `audit_id`.
    pub audit_id: Uuid,

    /// Requesting subject, if authenticated.
    pub subject_id: Option<String>,

    /// Delegator whose authority was used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_for: Option<String>,

    /// Requested action.
    pub action: Action,

    /// Targeted resource type.
    pub resource_type: ResourceType,

    /// Targeted instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Whether access was granted.
    pub allowed: bool,

    /// Allow, deny or error.
    pub outcome: AuditOutcome,

    /// Decision reason; absent for errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,

    /// Deciding rule; absent for errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<Rule>,

    /// The `resource_type:action` string checked.
    pub required_permission: String,

    /// The decision was made in fail-open degraded mode.
    #[serde(default)]
    pub degraded: bool,

    /// Fault description for error entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Correlation id from the request context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Client address from the request context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<IpAddr>,

    /// Evaluation timestamp from the request context.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditEntry {
    /// Starts building an entry for `action` on `resource_type`.
    #[must_use]
    pub fn builder(action: Action, resource_type: ResourceType) -> AuditEntryBuilder {
        AuditEntryBuilder::new(action, resource_type)
    }
}

/// Builder for [`AuditEntry`].
#[derive(Debug, Clone)]
pub struct AuditEntryBuilder {
    entry: AuditEntry,
}

impl AuditEntryBuilder {
    /// Creates a builder with a fresh id, `deny` outcome and the current time.
    #[must_use]
    pub fn new(action: Action, resource_type: ResourceType) -> Self {
        Self {
            entry: AuditEntry {
                audit_id: Uuid::new_v4(),
                subject_id: None,
                acting_for: None,
                action,
                resource_type,
                resource_id: None,
                allowed: false,
                outcome: AuditOutcome::Deny,
                reason: None,
                matched_rule: None,
                required_permission: format!("{resource_type}:{action}"),
                degraded: false,
                error: None,
                request_id: None,
                source_ip: None,
                timestamp: OffsetDateTime::now_utc(),
            },
        }
    }

    /// Set the audit id
    #[must_use]
    pub fn audit_id(mut self, id: Uuid) -> Self {
        self.entry.audit_id = id;
        self
    }

    /// Set the requesting subject
    #[must_use]
    pub fn subject(mut self, id: Option<String>) -> Self {
        self.entry.subject_id = id;
        self
    }

    /// Set the targeted instance
    #[must_use]
    pub fn resource_id(mut self, id: Option<String>) -> Self {
        self.entry.resource_id = id;
        self
    }

    /// Copy outcome, reason, rule and delegator from a decision
    #[must_use]
    pub fn decision(mut self, decision: &Decision) -> Self {
        self.entry.allowed = decision.allowed;
        self.entry.outcome = if decision.allowed {
            AuditOutcome::Allow
        } else {
            AuditOutcome::Deny
        };
        self.entry.reason = Some(decision.reason);
        self.entry.matched_rule = Some(decision.matched_rule.clone());
        self.entry.required_permission = decision.required_permission.clone();
        self.entry.degraded = decision.degraded;
        self.entry.acting_for = match &decision.matched_rule {
            Rule::Delegation { delegator_id, .. } => Some(delegator_id.clone()),
            _ => None,
        };
        self
    }

    /// Mark the entry as an infrastructure fault
    #[must_use]
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.entry.allowed = false;
        self.entry.outcome = AuditOutcome::Error;
        self.entry.error = Some(message.into());
        self
    }

    /// Set the request id
    #[must_use]
    pub fn request_id(mut self, id: Option<String>) -> Self {
        self.entry.request_id = id;
        self
    }

    /// Set the source IP address
    #[must_use]
    pub fn source_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.entry.source_ip = ip;
        self
    }

    /// Set the evaluation timestamp
    #[must_use]
    pub fn timestamp(mut self, at: OffsetDateTime) -> Self {
        self.entry.timestamp = at;
        self
    }

    /// Build the entry
    #[must_use]
    pub fn build(self) -> AuditEntry {
        self.entry
    }
}

// =============================================================================
// Query Filter
// =============================================================================

/// Compliance-review filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub subject_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<String>,
    pub outcome: Option<AuditOutcome>,
    /// Inclusive lower bound on `timestamp`.
    pub since: Option<OffsetDateTime>,
    /// Exclusive upper bound on `timestamp`.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of entries returned.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Creates a filter matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subject(mut self, id: impl Into<String>) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn resource(mut self, resource_type: ResourceType, id: Option<String>) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = id;
        self
    }

    #[must_use]
    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn between(mut self, since: OffsetDateTime, until: OffsetDateTime) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if the entry passes every set criterion.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.subject_id
            .as_ref()
            .is_none_or(|id| entry.subject_id.as_ref() == Some(id))
            && self
                .resource_type
                .is_none_or(|rt| entry.resource_type == rt)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|id| entry.resource_id.as_ref() == Some(id))
            && self.outcome.is_none_or(|o| entry.outcome == o)
            && self.since.is_none_or(|since| entry.timestamp >= since)
            && self.until.is_none_or(|until| entry.timestamp < until)
    }
}

// =============================================================================
// Recorder Trait
// =============================================================================

/// Append-only sink for audit entries.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Persists an entry. Returns once the entry is durable.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Audit` if the entry could not be persisted.
    async fn append(&self, entry: AuditEntry) -> AuthResult<()>;

    /// Returns matching entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    async fn query(&self, filter: &AuditFilter) -> AuthResult<Vec<AuditEntry>>;
}

/// In-memory append-only audit log.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns every entry in append order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditRecorder for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> AuthResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter) -> AuthResult<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        let matching = entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }
}
