//! Shipwright CLI
//!
//! Command-line interface of the shipwright cluster installer.

mod args;
mod cli;
mod remote;
mod renderer;

use std::sync::Arc;

use anyhow::{Context, Result};
use args::{Args, Commands};
use clap::Parser;
use cli::Cli;
use log::info;
use remote::SshRemote;
use renderer::TerminalRenderer;
use shipwright_core::OperatorBuilder;
use Commands::*;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        operation_id,
        config,
        ssh_user,
        no_color,
        command,
    } = Args::parse();

    let operator = OperatorBuilder::new()
        .with_database_path(database_file)
        .build()
        .await
        .context("Failed to initialize operation database")?;
    info!("using database {}", operator.database_path().display());

    let cli = Cli::new(operator, TerminalRenderer::new(!no_color))
        .with_remote(Arc::new(SshRemote::new(ssh_user)))
        .with_operation_id(operation_id)
        .with_config(config);

    match command {
        Some(Install) => cli.install().await,
        Some(Expand) => cli.expand().await,
        Some(Reconfigure) => cli.reconfigure().await,
        Some(Plan { command }) => cli.handle_plan_command(command).await,
        Some(Progress) => cli.progress().await,
        Some(Check { command }) => cli.handle_check_command(command).await,
        Some(Operations) | None => cli.list_operations().await,
    }
}
