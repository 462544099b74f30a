//! Move events and move errors for tic-tac-toe.

use super::Mark;
use serde::{Deserialize, Serialize};

/// A move in tic-tac-toe: a mark placed at a board index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_new::new)]
pub struct Move {
    /// The mark being placed.
    pub mark: Mark,
    /// Board index (0-8).
    pub position: usize,
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.mark, self.position + 1)
    }
}

/// Error that can occur when applying a move to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum MoveError {
    /// The position is outside 0-8 or already occupied.
    #[display("Invalid move at index {}", _0)]
    InvalidMove(usize),

    /// The acting seat does not hold the turn; carries the mark to move.
    #[display("It's not your turn, waiting for {}", _0)]
    NotYourTurn(Mark),

    /// The match has already finished.
    #[display("Game is already over")]
    GameAlreadyOver,

    /// The engine was asked to move when it isn't its move.
    #[display("The bot cannot move now")]
    NotApplicable,

    /// The match still waits for its second player.
    #[display("Waiting for an opponent to join")]
    AwaitingOpponent,
}

impl std::error::Error for MoveError {}
