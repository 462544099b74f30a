//! Durable match records.
//!
//! The registry only lives as long as the process, while stakes live in the
//! ledger. A match record is written in the same atomic step as every stake
//! and settlement of its match, so after a restart the ledger still knows
//! which matches hold escrowed points.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use super::ledger::{Ledger, LedgerError, Posting, TransactionId, TransactionKind};
use crate::games::tictactoe::{Match, MatchId, MatchPhase, Outcome, ParticipantId};

/// Stored lifecycle state of a match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum MatchStatus {
    /// Waiting for a second player.
    Pending,
    /// Being played.
    Active,
    /// Finished and settled.
    Completed,
    /// Cancelled by its creator, stake refunded.
    Cancelled,
    /// Lost with the process that hosted it, stakes refunded.
    Abandoned,
}

impl MatchStatus {
    /// Whether stakes are still escrowed under this status.
    pub fn is_open(self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Active)
    }
}

/// Persistent summary of one match: seats, wager and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize, derive_new::new)]
pub struct MatchRecord {
    id: MatchId,
    seat_a: ParticipantId,
    seat_b: Option<ParticipantId>,
    wager: i64,
    vs_bot: bool,
    status: MatchStatus,
    outcome: Option<Outcome>,
    created_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
}

impl MatchRecord {
    /// Record of a freshly created match.
    pub fn opened(game: &Match, now: NaiveDateTime) -> Self {
        let status = match game.phase() {
            MatchPhase::WaitingForSecondPlayer => MatchStatus::Pending,
            MatchPhase::InProgress | MatchPhase::Over => MatchStatus::Active,
        };
        Self::new(
            game.id(),
            game.seat_a(),
            game.seat_b(),
            game.wager(),
            game.vs_bot(),
            status,
            None,
            now,
            None,
        )
    }

    /// Adjustments returning every escrowed stake of this match.
    pub fn refunds(&self) -> Vec<Posting> {
        if self.wager <= 0 {
            return Vec::new();
        }
        std::iter::once(self.seat_a)
            .chain(self.seat_b)
            .map(|participant| {
                Posting::new(participant, self.wager, TransactionKind::Adjustment)
                    .with_match_id(self.id)
                    .with_detail(format!("Stake refunded for abandoned match #{}", self.id))
            })
            .collect()
    }

    /// Fills the second seat of a pending match.
    pub(crate) fn seat(&mut self, participant: ParticipantId) -> Result<(), LedgerError> {
        if self.status != MatchStatus::Pending {
            return Err(LedgerError::MatchClosed {
                id: self.id,
                status: self.status,
            });
        }
        self.seat_b = Some(participant);
        self.status = MatchStatus::Active;
        Ok(())
    }

    /// Marks an open match final.
    pub(crate) fn close(
        &mut self,
        status: MatchStatus,
        outcome: Option<Outcome>,
        at: NaiveDateTime,
    ) -> Result<(), LedgerError> {
        if !self.status.is_open() {
            return Err(LedgerError::MatchClosed {
                id: self.id,
                status: self.status,
            });
        }
        self.status = status;
        self.outcome = outcome;
        self.completed_at = Some(at);
        Ok(())
    }
}

/// Match records stored beside the ledger.
///
/// Every write carries the postings it accounts for and applies both or
/// neither.
pub trait MatchBook: Ledger {
    /// Stores a new record and applies `stakes`.
    fn open_match(&self, record: &MatchRecord, stakes: &[Posting]) -> Result<(), LedgerError>;

    /// Seats the second player of a pending match, marks it active and
    /// applies `stakes`.
    ///
    /// Fails with [`LedgerError::MatchClosed`] unless the match is pending.
    fn seat_match(
        &self,
        id: MatchId,
        participant: ParticipantId,
        stakes: &[Posting],
    ) -> Result<(), LedgerError>;

    /// Moves an open match to the final `status` and applies `postings`.
    ///
    /// Fails with [`LedgerError::MatchClosed`] if the match is already
    /// final, so a settlement can never be applied twice.
    fn close_match(
        &self,
        id: MatchId,
        status: MatchStatus,
        outcome: Option<Outcome>,
        postings: &[Posting],
    ) -> Result<Vec<TransactionId>, LedgerError>;

    /// Looks up a record.
    fn match_record(&self, id: MatchId) -> Result<Option<MatchRecord>, LedgerError>;

    /// Pending and active records, oldest first.
    fn unfinished_matches(&self) -> Result<Vec<MatchRecord>, LedgerError>;

    /// Highest stored match id.
    fn last_match_id(&self) -> Result<Option<MatchId>, LedgerError>;
}
