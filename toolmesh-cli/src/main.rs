mod cli;
mod commands;
mod logging;
mod runtime;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Mcp { .. } | Commands::Proxy { .. } => {
            logging::init_stdio_safe(cli.log_level.as_deref())?;
        }
        _ => {
            logging::init_default(cli.log_level.as_deref())?;
        }
    }

    match cli.command {
        Commands::Serve { config } => commands::serve::run(config).await,
        Commands::Mcp { config } => commands::mcp::run(config).await,
        Commands::Proxy {
            config,
            endpoint,
            client_id,
            no_spawn,
        } => commands::proxy::run(config, endpoint, client_id, no_spawn).await,
        Commands::Status { config } => commands::status::run(config).await,
        Commands::Config { action } => match action {
            ConfigAction::Validate { config } => commands::config::validate(config),
            ConfigAction::Sample => commands::config::sample(),
        },
    }
}
