//! Strictly XO library - wagered tic-tac-toe with a points economy
//!
//! # Architecture
//!
//! - **Games**: board, match state machine and minimax opponent
//! - **Economy**: ledger collaborator, escrow settlement, deposits and
//!   admin-approved withdrawals
//! - **Db**: SQLite ledger behind diesel
//! - **Service**: match registry and the typed operations a front end calls
//! - **Dispatch**: chat command decoding and replies
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use strictly_xo::{Dispatcher, EconomyConfig, MemoryLedger};
//!
//! let dispatcher = Dispatcher::new(Arc::new(MemoryLedger::default()), &EconomyConfig::default());
//! let reply = dispatcher.handle_text(1, "alice", "/balance");
//! assert_eq!(reply.text(), "Balance: 100 points");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod db;
mod dispatch;
mod economy;
mod error;
mod games;
mod service;
mod session;

// Crate-level exports - Configuration
pub use config::{ConfigError, EconomyConfig};

// Crate-level exports - Persistence
pub use db::{DbError, DbStage, LedgerRepository, MIGRATIONS};

// Crate-level exports - Dispatcher
pub use dispatch::{Command, CommandError, Dispatcher, Reply};

// Crate-level exports - Economy
pub use economy::{
    BalanceEffect, GameOutcome, Identity, Ledger, LedgerError, MatchBook, MatchRecord,
    MatchStatus, MemoryLedger, PaymentError, PaymentMethod, PaymentProcessor, Posting, Settlement,
    Standing, Transaction, TransactionId, TransactionKind, TransactionStatus, WithdrawalQuote,
    WithdrawalRequest, stake, winner_of,
};

// Crate-level exports - Errors
pub use error::{ArenaError, ErrorKind};

// Crate-level exports - Service
pub use service::ArenaService;
pub use session::MatchRegistry;

// Crate-level exports - Game types (tic-tac-toe)
pub use games::tictactoe::{
    Adversary, Board, CellView, DEFAULT_OPENING_RANDOMNESS, Mark, Match, MatchId, MatchPhase,
    MatchView, Move, MoveError, Outcome, ParticipantId, Position, Seat, SeatError, Square,
};
pub use games::tictactoe::rules::{check_winner, is_draw, is_full};
