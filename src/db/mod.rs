//! SQLite persistence for participants and the transaction ledger.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::{DbError, DbStage};
pub use repository::LedgerRepository;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

/// Schema migrations compiled into the binary.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
