mod cli;
mod commands;
mod fixtures;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level);

    match &cli.command {
        Commands::CheckConfig(args) => {
            commands::config::check(&args.file)?;
        }
        Commands::Catalog(args) => {
            commands::catalog::print(args.config.as_deref())?;
        }
        Commands::Evaluate(args) => {
            commands::evaluate::evaluate(args).await?;
        }
    }

    Ok(())
}
