//! Roles and the rank hierarchy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::rbac::UnknownValue;

// =============================================================================
// Role
// =============================================================================

/// The fixed set of practice roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A patient of the practice.
    Patient,
    /// Front-desk staff.
    Rezeption,
    /// Medical assistant.
    Assistent,
    /// Physician.
    Arzt,
    /// Practice administrator.
    Admin,
    /// Universal-access role.
    Superadmin,
}

impl Role {
    /// All roles, in default rank order.
    pub const ALL: [Role; 6] = [
        Role::Patient,
        Role::Rezeption,
        Role::Assistent,
        Role::Arzt,
        Role::Admin,
        Role::Superadmin,
    ];

    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Rezeption => "rezeption",
            Self::Assistent => "assistent",
            Self::Arzt => "arzt",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }

    /// Default rank used when the configuration does not override it.
    #[must_use]
    pub fn default_rank(&self) -> u16 {
        match self {
            Self::Patient => 10,
            Self::Rezeption => 20,
            Self::Assistent => 30,
            Self::Arzt => 40,
            Self::Admin => 50,
            Self::Superadmin => 100,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue::new("role", s))
    }
}

// =============================================================================
// Role Hierarchy
// =============================================================================

/// Rank assigned to role names that are not part of the hierarchy.
pub const LOWEST_RANK: u16 = 0;

/// Strict total order over [`Role`].
///
/// Every role has a distinct rank, so rank comparison never has ties and the
/// order cannot contain cycles. The role with the highest rank is the
/// universal-access role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHierarchy {
    ranks: BTreeMap<Role, u16>,
    top: Role,
}

impl Default for RoleHierarchy {
    fn default() -> Self {
        let ranks: BTreeMap<Role, u16> =
            Role::ALL.into_iter().map(|r| (r, r.default_rank())).collect();
        Self {
            ranks,
            top: Role::Superadmin,
        }
    }
}

impl RoleHierarchy {
    /// Builds a hierarchy from default ranks with the given overrides applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if two roles end up sharing a rank
    /// or a role is assigned [`LOWEST_RANK`].
    pub fn with_overrides(overrides: &BTreeMap<Role, u16>) -> Result<Self, ConfigError> {
        let mut ranks: BTreeMap<Role, u16> =
            Role::ALL.into_iter().map(|r| (r, r.default_rank())).collect();
        ranks.extend(overrides.iter().map(|(role, rank)| (*role, *rank)));

        let mut seen: BTreeMap<u16, Role> = BTreeMap::new();
        for (role, rank) in &ranks {
            if *rank == LOWEST_RANK {
                return Err(ConfigError::InvalidValue(format!(
                    "rank of role '{role}' must be greater than {LOWEST_RANK}"
                )));
            }
            if let Some(other) = seen.insert(*rank, *role) {
                return Err(ConfigError::InvalidValue(format!(
                    "roles '{other}' and '{role}' share rank {rank}"
                )));
            }
        }

        // `seen` is keyed by rank, so its last entry is the top role.
        let top = seen
            .values()
            .next_back()
            .copied()
            .ok_or_else(|| ConfigError::Missing("roles".to_string()))?;

        Ok(Self { ranks, top })
    }

    /// Returns the rank of a role.
    #[must_use]
    pub fn rank(&self, role: Role) -> u16 {
        self.ranks.get(&role).copied().unwrap_or(LOWEST_RANK)
    }

    /// Returns the rank of a role given by name.
    ///
    /// Names outside the hierarchy rank lowest, so they satisfy no requirement.
    #[must_use]
    pub fn rank_of_name(&self, name: &str) -> u16 {
        match name.parse::<Role>() {
            Ok(role) => self.rank(role),
            Err(_) => {
                tracing::warn!(role = %name, "Unknown role name ranks lowest");
                LOWEST_RANK
            }
        }
    }

    /// Returns `true` iff `role` ranks at or above `required`.
    ///
    /// The top role satisfies every requirement.
    #[must_use]
    pub fn is_at_least(&self, role: Role, required: Role) -> bool {
        self.is_top(role) || self.rank(role) >= self.rank(required)
    }

    /// Returns `true` if the role is the universal-access role.
    #[must_use]
    pub fn is_top(&self, role: Role) -> bool {
        role == self.top
    }

    /// Returns the universal-access role.
    #[must_use]
    pub fn top_role(&self) -> Role {
        self.top
    }

    /// Returns all roles ordered by ascending rank.
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.ranks.keys().copied().collect();
        roles.sort_by_key(|r| self.rank(*r));
        roles
    }

    /// Returns the highest-ranked role among `roles`.
    pub fn highest<I>(&self, roles: I) -> Option<Role>
    where
        I: IntoIterator<Item = Role>,
    {
        roles.into_iter().max_by_key(|r| self.rank(*r))
    }
}
