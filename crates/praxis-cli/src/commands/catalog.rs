use std::path::Path;

use anyhow::Result;
use colored::Colorize;

pub fn print(path: Option<&Path>) -> Result<()> {
    let config = super::load_config(path)?;
    let catalog = config.catalog()?;

    println!("{:<22} {}", "Permission".cyan(), "Minimal role".cyan());
    for (permission, role) in catalog.entries() {
        let marker = if catalog.is_self_service(permission.resource_type, permission.action) {
            " +owner"
        } else {
            ""
        };
        println!("{:<22} {role}{marker}", permission.to_string());
    }
    Ok(())
}
