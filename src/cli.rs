//! Command-line interface for strictly_xo.

use clap::{Parser, Subcommand};

/// Strictly XO - wagered tic-tac-toe with a points ledger
#[derive(Parser, Debug)]
#[command(name = "strictly_xo")]
#[command(about = "Wagered tic-tac-toe with a minimax bot and a points ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or migrate the database, optionally seeding an admin
    Init {
        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "strictly_xo.db")]
        db_path: String,

        /// Economy config used for the admin's starting balance
        #[arg(long)]
        config: Option<std::path::PathBuf>,

        /// Participant id to grant admin rights
        #[arg(long)]
        admin: Option<i64>,

        /// Display name of the admin
        #[arg(long, default_value = "admin")]
        name: String,
    },

    /// Read chat commands from stdin and print replies
    Repl {
        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "strictly_xo.db")]
        db_path: String,

        /// Economy config (TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<std::path::PathBuf>,

        /// Participant id issuing the commands
        #[arg(long)]
        user: i64,

        /// Display name of the participant
        #[arg(long, default_value = "player")]
        name: String,

        /// Print each reply as JSON
        #[arg(long)]
        json: bool,
    },
}
