//! Role hierarchy and permission catalog.
//!
//! - [`role`] - the closed [`Role`] set and its rank order ([`RoleHierarchy`])
//! - [`catalog`] - resource types, actions, permission patterns and the
//!   default minimal-role table ([`PermissionCatalog`])

pub mod catalog;
pub mod role;

pub use catalog::{
    Action, ActionPattern, Permission, PermissionCatalog, PermissionPattern, ResourcePattern,
    ResourceType,
};
pub use role::{LOWEST_RANK, Role, RoleHierarchy};

/// A name that is not part of one of the closed vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct UnknownValue {
    /// Vocabulary the value was parsed against (e.g. "role").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl UnknownValue {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
