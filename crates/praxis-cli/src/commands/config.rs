use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::output::print_success;

pub fn check(path: &Path) -> Result<()> {
    let config = super::load_config(Some(path))?;
    let hierarchy = config.hierarchy()?;

    print_success(&format!("{} is valid", path.display()));
    println!("{}", "Role ranks".cyan());
    for role in hierarchy.roles().into_iter().rev() {
        let marker = if hierarchy.is_top(role) { " (bypass)" } else { "" };
        println!("  {:<10} {:>4}{marker}", role.as_str(), hierarchy.rank(role));
    }
    println!(
        "{}: {:?}",
        "Loader timeout".cyan(),
        config.evaluator.loader_timeout
    );
    println!(
        "{}: {}",
        "Audit".cyan(),
        if config.audit.queued { "queued" } else { "direct" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_check_rejects_colliding_ranks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[roles]\narzt = 30").unwrap();
        assert!(check(file.path()).is_err());
    }

    #[test]
    fn test_check_accepts_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[roles]\narzt = 45\n\n[evaluator]\nloader_timeout = \"500ms\"").unwrap();
        assert!(check(file.path()).is_ok());
    }

    #[test]
    fn test_demo_config_is_valid() {
        let config =
            praxis_auth::AuthzConfig::from_toml_str(include_str!("../../../../demos/praxis-authz.toml"))
                .unwrap();
        assert!(config.validate().is_ok());
    }
}
