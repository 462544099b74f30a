//! Failures surfaced at the dispatcher boundary.

use serde::Serialize;

use crate::economy::{LedgerError, PaymentError};
use crate::games::tictactoe::{MatchId, MoveError};

/// Coarse failure category shared by every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Out-of-range or occupied square.
    InvalidMove,
    /// The acting seat does not hold the turn.
    NotYourTurn,
    /// The match is over.
    GameAlreadyOver,
    /// The operation does not apply to the match in its current state.
    NotApplicable,
    /// A debit would overdraw the balance.
    InsufficientBalance,
    /// Non-positive or out-of-limits amount.
    InvalidAmount,
    /// Approve or reject on a record that is not pending.
    InvalidTransactionState,
    /// The ledger could not be reached; the request may be retried.
    LedgerUnavailable,
    /// Unknown match, transaction or participant, or a request the actor
    /// may not make.
    Rejected,
}

/// Failure of an arena operation.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
pub enum ArenaError {
    /// The match refused the move.
    #[display("{}", _0)]
    Move(MoveError),

    /// The ledger refused or failed.
    #[display("{}", _0)]
    Ledger(LedgerError),

    /// The payment pipeline refused or failed.
    #[display("{}", _0)]
    Payment(PaymentError),

    /// No active match with this identifier.
    #[display("Match #{} not found", _0)]
    #[from(ignore)]
    MatchNotFound(MatchId),

    /// The match does not take another player.
    #[display("Match #{} is not open for joining", _0)]
    #[from(ignore)]
    MatchFull(MatchId),

    /// The actor already sits in this match.
    #[display("You are already playing in match #{}", _0)]
    #[from(ignore)]
    AlreadyInMatch(MatchId),

    /// The actor holds no seat in this match.
    #[display("You are not a player in match #{}", _0)]
    #[from(ignore)]
    NotAParticipant(MatchId),

    /// Only matches still waiting for an opponent can be cancelled.
    #[display("Match #{} can no longer be cancelled", _0)]
    #[from(ignore)]
    NotCancellable(MatchId),

    /// Settlement requested before the match ended.
    #[display("Match #{} is still being played", _0)]
    #[from(ignore)]
    MatchNotOver(MatchId),

    /// Wager outside the configured limits.
    #[display("Wager must be between {} and {} points, got {}", min, max, wager)]
    #[from(ignore)]
    WagerOutOfRange {
        /// Requested wager.
        wager: i64,
        /// Smallest accepted wager.
        min: i64,
        /// Largest accepted wager.
        max: i64,
    },

    /// The actor lacks the privilege for this operation.
    #[display("You are not allowed to do that")]
    #[from(ignore)]
    Unauthorized,
}

impl std::error::Error for ArenaError {}

impl ArenaError {
    /// Category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArenaError::Move(e) => move_kind(e),
            ArenaError::Ledger(e) => ledger_kind(e),
            ArenaError::Payment(PaymentError::InvalidAmount(_)) => ErrorKind::InvalidAmount,
            ArenaError::Payment(PaymentError::Ledger(e)) => ledger_kind(e),
            ArenaError::WagerOutOfRange { .. } => ErrorKind::InvalidAmount,
            ArenaError::MatchNotOver(_) | ArenaError::NotCancellable(_) => ErrorKind::NotApplicable,
            ArenaError::MatchNotFound(_)
            | ArenaError::MatchFull(_)
            | ArenaError::AlreadyInMatch(_)
            | ArenaError::NotAParticipant(_)
            | ArenaError::Unauthorized => ErrorKind::Rejected,
        }
    }

    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::LedgerUnavailable
    }
}

fn move_kind(err: &MoveError) -> ErrorKind {
    match err {
        MoveError::InvalidMove(_) => ErrorKind::InvalidMove,
        MoveError::NotYourTurn(_) => ErrorKind::NotYourTurn,
        MoveError::GameAlreadyOver => ErrorKind::GameAlreadyOver,
        MoveError::NotApplicable | MoveError::AwaitingOpponent => ErrorKind::NotApplicable,
    }
}

fn ledger_kind(err: &LedgerError) -> ErrorKind {
    match err {
        LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
        LedgerError::InvalidTransactionState { .. } => ErrorKind::InvalidTransactionState,
        LedgerError::BalanceOverflow { .. } => ErrorKind::InvalidAmount,
        LedgerError::MatchClosed { .. } => ErrorKind::NotApplicable,
        LedgerError::Unavailable(_) => ErrorKind::LedgerUnavailable,
        LedgerError::UnknownParticipant(_)
        | LedgerError::UnknownMatch(_)
        | LedgerError::TransactionNotFound(_) => ErrorKind::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;

    #[test]
    fn test_kinds_follow_taxonomy() {
        assert_eq!(ArenaError::from(MoveError::InvalidMove(9)).kind(), ErrorKind::InvalidMove);
        assert_eq!(
            ArenaError::from(PaymentError::InvalidAmount(0)).kind(),
            ErrorKind::InvalidAmount
        );
        assert_eq!(
            ArenaError::from(PaymentError::Ledger(LedgerError::Unavailable(DbError::new("down"))))
                .kind(),
            ErrorKind::LedgerUnavailable
        );
        assert_eq!(ArenaError::MatchNotFound(3).kind(), ErrorKind::Rejected);
    }

    #[test]
    fn test_overflow_is_an_invalid_amount() {
        let err = ArenaError::from(LedgerError::BalanceOverflow {
            participant: 1,
            balance: 100,
            delta: i64::MAX,
        });
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_ledger_outage_is_retryable() {
        assert!(ArenaError::from(LedgerError::Unavailable(DbError::new("down"))).is_retryable());
        assert!(!ArenaError::from(MoveError::GameAlreadyOver).is_retryable());
    }
}
