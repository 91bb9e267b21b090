//! Evaluation requests and their context.

use std::net::IpAddr;

use time::OffsetDateTime;

use crate::policy::constraints::ConstraintSet;
use crate::rbac::{Action, ResourceType};
use crate::types::{ResourceInstance, Subject};

/// Per-request environment.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Instant the decision is made for. Delegation windows, grant expiry
    /// and business hours are all checked against this.
    pub timestamp: OffsetDateTime,

    /// Client address, if known.
    pub source_ip: Option<IpAddr>,

    /// Correlation id carried into the audit entry.
    pub request_id: Option<String>,

    /// Contextual predicates this call site opted into.
    pub constraints: Option<ConstraintSet>,
}

impl EvaluationContext {
    /// Creates a context for `timestamp` with no constraints.
    #[must_use]
    pub fn new(timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            source_ip: None,
            request_id: None,
            constraints: None,
        }
    }

    /// Creates a context for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self::new(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn with_source_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::now()
    }
}

/// What the request targets.
#[derive(Debug, Clone)]
pub enum Target {
    /// The resource type as a whole.
    Type,
    /// An instance the evaluator must load.
    Id(String),
    /// An instance the caller already loaded.
    Instance(ResourceInstance),
}

impl Target {
    /// Returns the instance id, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Type => None,
            Self::Id(id) => Some(id),
            Self::Instance(instance) => Some(&instance.id),
        }
    }
}

/// Input to `PolicyEvaluator::authorize`.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Authenticated subject, or `None` for anonymous requests.
    pub subject: Option<Subject>,
    /// Requested action.
    pub action: Action,
    /// Targeted resource type.
    pub resource_type: ResourceType,
    /// Targeted instance.
    pub target: Target,
    /// Request environment.
    pub context: EvaluationContext,
}

impl AuthorizeRequest {
    /// Creates a type-level request evaluated at the current instant.
    #[must_use]
    pub fn new(subject: Option<Subject>, action: Action, resource_type: ResourceType) -> Self {
        Self {
            subject,
            action,
            resource_type,
            target: Target::Type,
            context: EvaluationContext::now(),
        }
    }

    /// Targets an instance by id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.target = Target::Id(id.into());
        self
    }

    /// Targets a pre-loaded instance.
    #[must_use]
    pub fn with_instance(mut self, instance: ResourceInstance) -> Self {
        self.target = Target::Instance(instance);
        self
    }

    /// Replaces the evaluation context.
    #[must_use]
    pub fn with_context(mut self, context: EvaluationContext) -> Self {
        self.context = context;
        self
    }

    /// Returns the permission string checked for this request.
    #[must_use]
    pub fn required_permission(&self) -> String {
        format!("{}:{}", self.resource_type, self.action)
    }
}
