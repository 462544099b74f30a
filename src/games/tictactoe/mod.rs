//! Tic-tac-toe: board, rules, match state machine and minimax opponent.

mod action;
mod adversary;
mod game;
mod position;
pub mod rules;
mod types;

pub use action::{Move, MoveError};
pub use adversary::{Adversary, DEFAULT_OPENING_RANDOMNESS};
pub use game::{Match, MatchId, MatchPhase, MatchView, Outcome, ParticipantId, Seat, SeatError};
pub use position::Position;
pub use types::{Board, CellView, Mark, Square};
