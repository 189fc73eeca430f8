//! Petsync CLI - keep pet records offline and sync them when online

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    if cfg!(debug_assertions) {
        dotenvy::dotenv().ok();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("petsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let profile = cli.profile.as_deref();

    match cli.command {
        Some(Commands::Add(fields)) => commands::pets::run_add(fields, &db_path).await,
        Some(Commands::Update { id, fields }) => {
            commands::pets::run_update(&id, fields, &db_path).await
        }
        Some(Commands::Delete { id }) => commands::pets::run_delete(&id, &db_path).await,
        Some(Commands::List { json }) => commands::pets::run_list(json, &db_path).await,
        Some(Commands::Outbox { json }) => commands::outbox::run_outbox(json, &db_path).await,
        Some(Commands::Push) => commands::sync::run_push(&db_path, profile).await,
        Some(Commands::Pull { force }) => commands::sync::run_pull(force, &db_path, profile).await,
        Some(Commands::Sync) => commands::sync::run_sync(&db_path, profile).await,
        Some(Commands::Watch) => commands::sync::run_watch(&db_path, profile).await,
        Some(Commands::Config { command }) => commands::config::run_config(command, profile),
        Some(Commands::Auth { command }) => commands::auth_cmd::run_auth(command, profile),
        Some(Commands::Completions { shell, output }) => {
            commands::completions::run_completions(shell, output.as_deref())
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
