pub mod catalog;
pub mod config;
pub mod evaluate;

use std::path::Path;

use anyhow::{Context, Result};
use praxis_auth::AuthzConfig;

/// Loads the config at `path`, or the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<AuthzConfig> {
    match path {
        Some(path) => AuthzConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AuthzConfig::default()),
    }
}
