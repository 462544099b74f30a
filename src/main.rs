//! Strictly XO - Unified CLI
//!
//! Runs the chat command dispatcher over a SQLite ledger.

#![warn(missing_docs)]

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use strictly_xo::{Dispatcher, EconomyConfig, Identity, LedgerRepository};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init {
            db_path,
            config,
            admin,
            name,
        } => run_init(db_path, config.as_deref(), admin, name),
        Command::Repl {
            db_path,
            config,
            user,
            name,
            json,
        } => run_repl(db_path, config.as_deref(), user, name, json).await,
    }
}

/// Loads the economy config, falling back to defaults.
fn load_config(path: Option<&Path>) -> Result<EconomyConfig> {
    match path {
        Some(path) => Ok(EconomyConfig::from_file(path)?),
        None => {
            info!("No config given, using defaults");
            Ok(EconomyConfig::default())
        }
    }
}

/// Migrates the database and seeds the admin.
#[instrument(skip(config))]
fn run_init(
    db_path: String,
    config: Option<&Path>,
    admin: Option<i64>,
    name: String,
) -> Result<()> {
    let config = load_config(config)?;
    let repo = LedgerRepository::open(db_path, *config.initial_points())?;

    if let Some(admin) = admin {
        repo.ensure_participant(admin, &name)?;
        repo.set_admin(admin, true)?;
        info!(admin, "Admin seeded");
    }

    info!("Database ready");
    Ok(())
}

/// Reads commands line by line and prints one reply per line.
#[instrument(skip(config))]
async fn run_repl(
    db_path: String,
    config: Option<&Path>,
    user: i64,
    name: String,
    json: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let repo = Arc::new(LedgerRepository::open(db_path, *config.initial_points())?);
    let dispatcher = Arc::new(Dispatcher::new(repo, &config));
    let abandoned = dispatcher.arena().recover()?;
    if !abandoned.is_empty() {
        info!(?abandoned, "Refunded matches left unfinished by the last run");
    }

    info!(user, "Reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let dispatcher = Arc::clone(&dispatcher);
        let name = name.clone();
        // Bot replies run a full minimax search.
        let reply =
            tokio::task::spawn_blocking(move || dispatcher.handle_text(user, &name, &line)).await?;

        let output = if json {
            serde_json::to_string(&reply)?
        } else {
            reply.to_string()
        };
        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Input closed");
    Ok(())
}
