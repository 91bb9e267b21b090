//! Authorization configuration.
//!
//! All tables the evaluator consults (role ranks, permission catalog,
//! clearance, self-service, consent actions) and the operational knobs
//! (loader timeout, failure modes, audit queue, write retries) live in one
//! explicitly constructed [`AuthzConfig`]. Nothing is read from global state.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rbac::catalog::{default_clearance, default_consent_actions, default_self_service};
use crate::rbac::{Action, PermissionCatalog, PermissionPattern, ResourceType, Role, RoleHierarchy};
use crate::types::Confidentiality;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root authorization configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [roles]
/// rezeption = 25
///
/// [catalog.permissions]
/// "invoice:create" = "rezeption"
///
/// [evaluator]
/// loader_timeout = "2s"
/// default_failure_mode = "fail_closed"
///
/// [evaluator.failure_modes]
/// read = "fail_open"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Rank overrides, keyed by role name.
    pub roles: BTreeMap<String, u16>,

    /// Permission catalog overrides.
    pub catalog: CatalogConfig,

    /// Evaluator behaviour.
    pub evaluator: EvaluatorConfig,

    /// Audit sink configuration.
    pub audit: AuditConfig,

    /// Grant and delegation store configuration.
    pub storage: StorageConfig,
}

impl AuthzConfig {
    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed input.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - role ranks collide or are zero
    /// - a catalog key does not parse
    /// - a failure-mode key is not an action
    /// - the loader timeout or audit limits are zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hierarchy = self.hierarchy()?;
        PermissionCatalog::from_config(&self.catalog, hierarchy)?;

        for key in self.evaluator.failure_modes.keys() {
            key.parse::<Action>().map_err(|e| {
                ConfigError::InvalidValue(format!("evaluator.failure_modes: {e}"))
            })?;
        }

        if self.evaluator.loader_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "evaluator.loader_timeout must be > 0".to_string(),
            ));
        }

        if self.audit.queued {
            if self.audit.queue_capacity == 0 {
                return Err(ConfigError::InvalidValue(
                    "audit.queue_capacity must be > 0".to_string(),
                ));
            }
            if self.audit.batch_size == 0 {
                return Err(ConfigError::InvalidValue(
                    "audit.batch_size must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Builds the role hierarchy.
    ///
    /// # Errors
    ///
    /// Returns an error if the rank overrides do not form a strict total order.
    pub fn hierarchy(&self) -> Result<RoleHierarchy, ConfigError> {
        let overrides = self
            .roles
            .iter()
            .map(|(name, rank)| {
                name.parse::<Role>()
                    .map(|role| (role, *rank))
                    .map_err(|e| ConfigError::InvalidValue(format!("roles: {e}")))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        RoleHierarchy::with_overrides(&overrides)
    }

    /// Builds the permission catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy or a catalog table is invalid.
    pub fn catalog(&self) -> Result<PermissionCatalog, ConfigError> {
        PermissionCatalog::from_config(&self.catalog, self.hierarchy()?)
    }
}

/// Permission catalog overrides.
///
/// Keys are strings so they can be written naturally in TOML tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Minimal-role overrides keyed by permission pattern (`patient:read`,
    /// `invoice:*`). Broader patterns are applied first.
    pub permissions: BTreeMap<String, Role>,

    /// Actions owners may perform on their own instances, keyed by resource type.
    /// Replaces the built-in table.
    pub self_service: BTreeMap<String, Vec<Action>>,

    /// Minimum role per confidentiality tier. Replaces the built-in table.
    pub clearance: BTreeMap<String, Role>,

    /// Actions that additionally require subject consent.
    pub consent_actions: Vec<Action>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            permissions: BTreeMap::new(),
            self_service: default_self_service()
                .into_iter()
                .map(|(rt, actions)| (rt.to_string(), actions.into_iter().collect()))
                .collect(),
            clearance: default_clearance()
                .into_iter()
                .map(|(tier, role)| (tier.to_string(), role))
                .collect(),
            consent_actions: default_consent_actions().into_iter().collect(),
        }
    }
}

impl CatalogConfig {
    /// Adds a minimal-role override.
    #[must_use]
    pub fn with_permission(mut self, pattern: PermissionPattern, role: Role) -> Self {
        self.permissions.insert(pattern.to_string(), role);
        self
    }

    /// Replaces the self-service actions for a resource type.
    #[must_use]
    pub fn with_self_service(mut self, resource_type: ResourceType, actions: Vec<Action>) -> Self {
        self.self_service.insert(resource_type.to_string(), actions);
        self
    }

    /// Sets the clearance for a tier.
    #[must_use]
    pub fn with_clearance(mut self, tier: Confidentiality, role: Role) -> Self {
        self.clearance.insert(tier.to_string(), role);
        self
    }
}

/// What the evaluator does when infrastructure fails mid-evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Abort with an error; access is not granted.
    #[default]
    FailClosed,
    /// Degrade to role-default-only evaluation.
    ///
    /// The confidentiality ceiling still applies. A targeted instance that
    /// could not be loaded is treated as the strictest tier.
    FailOpen,
}

/// Evaluator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Upper bound for one ResourceLoader call.
    #[serde(with = "humantime_serde")]
    pub loader_timeout: Duration,

    /// Failure mode for actions without an explicit entry.
    pub default_failure_mode: FailureMode,

    /// Per-action failure modes, keyed by action name.
    pub failure_modes: BTreeMap<String, FailureMode>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            loader_timeout: Duration::from_secs(2),
            default_failure_mode: FailureMode::FailClosed,
            failure_modes: BTreeMap::new(),
        }
    }
}

impl EvaluatorConfig {
    /// Returns the declared failure mode for an action.
    #[must_use]
    pub fn failure_mode(&self, action: Action) -> FailureMode {
        self.failure_modes
            .get(action.as_str())
            .copied()
            .unwrap_or(self.default_failure_mode)
    }

    /// Declares the failure mode for an action.
    #[must_use]
    pub fn with_failure_mode(mut self, action: Action, mode: FailureMode) -> Self {
        self.failure_modes.insert(action.to_string(), mode);
        self
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Route audit writes through the queued worker.
    pub queued: bool,

    /// Bounded channel capacity between evaluators and the worker.
    pub queue_capacity: usize,

    /// Maximum entries the worker drains per batch.
    pub batch_size: usize,

    /// Write attempts per entry after the first failure.
    pub max_retries: u32,

    /// Delay before the first retry; doubled on each further attempt.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queued: true,
            queue_capacity: 1024,
            batch_size: 64,
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Grant and delegation store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// How often a grant or delegation write is re-validated after a version conflict.
    pub max_write_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_write_retries: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AuthzConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.evaluator.failure_mode(Action::Read),
            FailureMode::FailClosed
        );
    }

    #[test]
    fn test_parse_toml() {
        let config = AuthzConfig::from_toml_str(
            r#"
            [roles]
            rezeption = 25

            [catalog.permissions]
            "invoice:create" = "rezeption"

            [catalog.clearance]
            sensitive = "arzt"

            [evaluator]
            loader_timeout = "500ms"

            [evaluator.failure_modes]
            read = "fail_open"

            [audit]
            batch_size = 8
            retry_backoff = "10ms"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.roles.get("rezeption"), Some(&25));
        assert_eq!(config.hierarchy().unwrap().rank(Role::Rezeption), 25);
        assert_eq!(config.evaluator.loader_timeout, Duration::from_millis(500));
        assert_eq!(
            config.evaluator.failure_mode(Action::Read),
            FailureMode::FailOpen
        );
        assert_eq!(
            config.evaluator.failure_mode(Action::Export),
            FailureMode::FailClosed
        );
        assert_eq!(config.audit.batch_size, 8);
        // Untouched sections keep their defaults.
        assert_eq!(config.storage.max_write_retries, 5);

        let catalog = config.catalog().unwrap();
        assert_eq!(
            catalog.minimal_role(ResourceType::Invoice, Action::Create),
            Role::Rezeption
        );
        assert_eq!(
            catalog.required_clearance(Confidentiality::Sensitive),
            Some(Role::Arzt)
        );
    }

    #[test]
    fn test_validate_rejects_bad_failure_mode_key() {
        let config = AuthzConfig {
            evaluator: EvaluatorConfig {
                failure_modes: BTreeMap::from([("fly".to_string(), FailureMode::FailOpen)]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_colliding_ranks() {
        let config = AuthzConfig {
            roles: BTreeMap::from([("admin".to_string(), 40)]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_role() {
        let config = AuthzConfig {
            roles: BTreeMap::from([("hausmeister".to_string(), 5)]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = AuthzConfig {
            evaluator: EvaluatorConfig {
                loader_timeout: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nmax_write_retries = 9").unwrap();

        let config = AuthzConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.max_write_retries, 9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AuthzConfig::load("/nonexistent/praxis-authz.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
