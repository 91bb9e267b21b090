//! Resource instances as seen by the evaluator.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rbac::{ResourceType, UnknownValue};

// =============================================================================
// Confidentiality
// =============================================================================

/// Sensitivity classification of a resource instance.
///
/// Tiers above [`Confidentiality::Normal`] act as a hard ceiling: only the
/// subject's role can clear them, never a grant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidentiality {
    /// Ordinary practice records.
    #[default]
    Normal,
    /// Records restricted to clinical staff.
    Sensitive,
    /// Records restricted to physicians (e.g. psychiatric notes).
    HighlySensitive,
}

impl Confidentiality {
    /// All tiers, ascending.
    pub const ALL: [Confidentiality; 3] = [
        Confidentiality::Normal,
        Confidentiality::Sensitive,
        Confidentiality::HighlySensitive,
    ];

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Sensitive => "sensitive",
            Self::HighlySensitive => "highly_sensitive",
        }
    }

    /// Returns `true` if the tier is above normal.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        *self > Self::Normal
    }
}

impl fmt::Display for Confidentiality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidentiality {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Confidentiality::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue::new("confidentiality tier", s))
    }
}

// =============================================================================
// Resource Instance
// =============================================================================

/// A specific resource instance supplied by a [`ResourceLoader`].
///
/// The evaluator only looks at ownership, location and confidentiality;
/// domain attributes are carried through untouched.
///
/// [`ResourceLoader`]: crate::policy::ResourceLoader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInstance {
    /// Resource id.
    pub id: String,

    /// Resource type.
    pub resource_type: ResourceType,

    /// Subject id of the owner (e.g. the patient a record belongs to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Practice location the resource belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,

    /// Confidentiality tier.
    #[serde(default)]
    pub confidentiality: Confidentiality,

    /// Domain attributes, opaque to the evaluator.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceInstance {
    /// Creates an instance with no owner, no location and normal confidentiality.
    #[must_use]
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type,
            owner_id: None,
            location_id: None,
            confidentiality: Confidentiality::Normal,
            attributes: HashMap::new(),
        }
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location_id: impl Into<String>) -> Self {
        self.location_id = Some(location_id.into());
        self
    }

    /// Sets the confidentiality tier.
    #[must_use]
    pub fn with_confidentiality(mut self, confidentiality: Confidentiality) -> Self {
        self.confidentiality = confidentiality;
        self
    }

    /// Adds a domain attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns `true` if `subject_id` owns this instance.
    #[must_use]
    pub fn is_owned_by(&self, subject_id: &str) -> bool {
        self.owner_id.as_deref() == Some(subject_id)
    }

    /// Returns the `type/id` reference string.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}
