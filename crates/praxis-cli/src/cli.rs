use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "praxis-authz")]
#[command(about = "Praxis authorization tooling: validate policy config and dry-run decisions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, env = "PRAXIS_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a config file, then print the role ranks
    CheckConfig(CheckConfigArgs),
    /// Print the effective permission table
    Catalog(CatalogArgs),
    /// Run one authorization decision against fixture data
    Evaluate(EvaluateArgs),
}

#[derive(clap::Args)]
pub struct CheckConfigArgs {
    /// Path to the TOML config
    pub file: PathBuf,
}

#[derive(clap::Args)]
pub struct CatalogArgs {
    /// Path to the TOML config (built-in tables if omitted)
    #[arg(short, long, env = "PRAXIS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct EvaluateArgs {
    /// Path to the TOML config (built-in tables if omitted)
    #[arg(short, long, env = "PRAXIS_CONFIG")]
    pub config: Option<PathBuf>,
    /// JSON fixture with subjects, resources, grants and delegations
    #[arg(long)]
    pub fixtures: PathBuf,
    /// Requesting subject id (anonymous if omitted)
    #[arg(long)]
    pub subject: Option<String>,
    /// Action (read, create, update, delete, export)
    #[arg(long)]
    pub action: String,
    /// Resource type, optionally with an instance id (e.g. patient/p-1042)
    #[arg(long)]
    pub resource: String,
    /// Evaluation time as RFC 3339 (defaults to now)
    #[arg(long)]
    pub at: Option<String>,
    /// Source IP address of the request
    #[arg(long)]
    pub ip: Option<IpAddr>,
    /// Enforce default business hours
    #[arg(long)]
    pub business_hours: bool,
    /// Restrict source addresses to these CIDR ranges
    #[arg(long = "allow-cidr")]
    pub allow_cidrs: Vec<String>,
}
