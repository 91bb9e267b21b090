//! Policy evaluation.
//!
//! - [`engine`] - the [`PolicyEvaluator`] decision engine
//! - [`context`] - requests and their evaluation context
//! - [`constraints`] - opt-in contextual predicates (business hours, IP allow-lists)
//! - [`decision`] - decisions, reason codes and matched rules
//! - [`loader`] - the [`ResourceLoader`] collaborator

pub mod constraints;
pub mod context;
pub mod decision;
pub mod engine;
pub mod loader;

pub use constraints::{BusinessHours, ConstraintKind, ConstraintSet, IpAllowList};
pub use context::{AuthorizeRequest, EvaluationContext, Target};
pub use decision::{Decision, ReasonCode, Rule, SubjectSummary};
pub use engine::PolicyEvaluator;
pub use loader::{InMemoryResourceLoader, ResourceLoader};
