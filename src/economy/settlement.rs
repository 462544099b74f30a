//! Wager escrow and settlement of finished matches.
//!
//! Every human seat stakes the wager when it sits down (a funds-checked
//! `bet` posting). When the match is over, one atomic batch returns the
//! stakes and moves the wager from loser to winner, so against pre-match
//! balances the winner gains exactly the wager and the loser pays it.
//! The engine has no balance: a human who beats it gets the stake back,
//! a human who loses to it forfeits the stake.

use tracing::{error, info, instrument};

use super::ledger::{
    BalanceEffect, GameOutcome, LedgerError, Posting, TransactionId, TransactionKind,
};
use super::record::{MatchBook, MatchStatus};
use crate::games::tictactoe::{Match, MatchId, Outcome, ParticipantId, Seat};

/// Funds-checked stake taken when a human takes a seat.
pub fn stake(participant: ParticipantId, wager: i64, match_id: MatchId) -> Posting {
    Posting::new(participant, -wager, TransactionKind::Bet)
        .with_effect(BalanceEffect::RequireFunds)
        .with_match_id(match_id)
        .with_detail(format!("Wager on match #{}", match_id))
}

fn stake_returned(participant: ParticipantId, wager: i64, match_id: MatchId) -> Posting {
    Posting::new(participant, wager, TransactionKind::Adjustment)
        .with_match_id(match_id)
        .with_detail(format!("Stake returned for match #{}", match_id))
}

/// The ledger batch resolving one finished match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    match_id: MatchId,
    outcome: Outcome,
    postings: Vec<Posting>,
}

impl Settlement {
    /// Builds the batch for a match that is over; `None` otherwise.
    #[instrument(skip(game), fields(match_id = game.id()))]
    pub fn for_match(game: &Match) -> Option<Self> {
        let outcome = game.outcome().filter(|_| game.is_over())?;
        let id = game.id();
        let wager = game.wager();
        let a = game.seat_a();

        let postings = match (outcome, game.seat_b()) {
            (Outcome::Void, _) => vec![
                Posting::new(a, wager, TransactionKind::Adjustment)
                    .with_match_id(id)
                    .with_detail(format!("Refund of wager on cancelled match #{}", id)),
            ],

            // Human against human.
            (Outcome::Draw, Some(b)) => vec![
                stake_returned(a, wager, id).with_tally(GameOutcome::Draw),
                stake_returned(b, wager, id).with_tally(GameOutcome::Draw),
            ],
            (Outcome::WinnerA | Outcome::WinnerB, Some(b)) => {
                let (winner, loser) = if outcome == Outcome::WinnerA { (a, b) } else { (b, a) };
                vec![
                    stake_returned(winner, wager, id),
                    stake_returned(loser, wager, id),
                    Posting::new(loser, -wager, TransactionKind::Loss)
                        .with_match_id(id)
                        .with_tally(GameOutcome::Loss)
                        .with_detail(format!("Lost match #{} to {}", id, winner)),
                    Posting::new(winner, wager, TransactionKind::Win)
                        .with_match_id(id)
                        .with_tally(GameOutcome::Win)
                        .with_detail(format!("Won match #{} against {}", id, loser)),
                ]
            }

            // Human against the engine (seat B is empty only in bot matches
            // once a match is past the waiting phase).
            (Outcome::Draw, None) => {
                vec![stake_returned(a, wager, id).with_tally(GameOutcome::Draw)]
            }
            (Outcome::WinnerA, None) => {
                vec![stake_returned(a, wager, id).with_tally(GameOutcome::Win)]
            }
            (Outcome::WinnerB, None) => vec![
                Posting::new(a, -wager, TransactionKind::Loss)
                    .with_effect(BalanceEffect::RecordOnly)
                    .with_match_id(id)
                    .with_tally(GameOutcome::Loss)
                    .with_detail(format!("Wager forfeited to the bot in match #{}", id)),
            ],
        };

        Some(Self {
            match_id: id,
            outcome,
            postings,
        })
    }

    /// Match being settled.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Outcome being settled.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Final stored status: cancelled for a void match, completed otherwise.
    pub fn status(&self) -> MatchStatus {
        if self.outcome == Outcome::Void {
            MatchStatus::Cancelled
        } else {
            MatchStatus::Completed
        }
    }

    /// The batch, in application order.
    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Net balance change for `participant`.
    pub fn net_change(&self, participant: ParticipantId) -> i64 {
        self.postings
            .iter()
            .filter(|p| *p.participant() == participant)
            .map(Posting::balance_delta)
            .sum()
    }

    /// Applies the batch and closes the stored match record in the same
    /// step. On failure nothing was applied and the caller may retry with
    /// the same settlement; a record that is already closed refuses it.
    #[instrument(skip(self, ledger), fields(match_id = self.match_id, outcome = %self.outcome))]
    pub fn apply<L: MatchBook + ?Sized>(
        &self,
        ledger: &L,
    ) -> Result<Vec<TransactionId>, LedgerError> {
        let outcome = Some(self.outcome);
        match ledger.close_match(self.match_id, self.status(), outcome, &self.postings) {
            Ok(ids) => {
                info!(records = ids.len(), "Settlement applied");
                Ok(ids)
            }
            Err(e) => {
                error!(error = %e, "Settlement not applied");
                Err(e)
            }
        }
    }
}

/// Winning seat and its participant (`None` for the engine).
pub fn winner_of(game: &Match) -> Option<(Seat, Option<ParticipantId>)> {
    let seat = game.outcome()?.winner()?;
    Some((seat, game.participant(seat)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finish(game: &mut Match, moves: &[(Seat, usize)]) {
        for &(seat, pos) in moves {
            game.submit_move(seat, pos).unwrap();
        }
        assert!(game.is_over());
    }

    const A_WINS: [(Seat, usize); 5] = [
        (Seat::A, 0),
        (Seat::B, 3),
        (Seat::A, 1),
        (Seat::B, 4),
        (Seat::A, 2),
    ];

    #[test]
    fn test_not_over_has_no_settlement() {
        let game = Match::create(1, 10, 50, false, Some(20));
        assert!(Settlement::for_match(&game).is_none());
    }

    #[test]
    fn test_human_win_moves_wager_net() {
        let mut game = Match::create(1, 10, 50, false, Some(20));
        finish(&mut game, &A_WINS);
        let settlement = Settlement::for_match(&game).unwrap();
        // Stakes were taken at seat time: winner gets 2W back, loser 0.
        assert_eq!(settlement.net_change(10), 100);
        assert_eq!(settlement.net_change(20), 0);
        assert_eq!(winner_of(&game), Some((Seat::A, Some(10))));
    }

    #[test]
    fn test_bot_win_forfeits_stake() {
        let mut game = Match::create(1, 10, 50, true, None);
        // X 0, O 4, X 1, O 2, X 8, O 6 -> O wins the anti-diagonal.
        let moves = [
            (Seat::A, 0),
            (Seat::B, 4),
            (Seat::A, 1),
            (Seat::B, 2),
            (Seat::A, 8),
            (Seat::B, 6),
        ];
        finish(&mut game, &moves);
        let settlement = Settlement::for_match(&game).unwrap();
        assert_eq!(settlement.outcome(), Outcome::WinnerB);
        assert_eq!(settlement.net_change(10), 0);
        assert_eq!(settlement.postings().len(), 1);
        assert_eq!(*settlement.postings()[0].kind(), TransactionKind::Loss);
    }

    #[test]
    fn test_void_refunds_creator_only() {
        let mut game = Match::create(1, 10, 50, false, None);
        game.cancel().unwrap();
        let settlement = Settlement::for_match(&game).unwrap();
        assert_eq!(settlement.net_change(10), 50);
        assert_eq!(settlement.status(), MatchStatus::Cancelled);
        assert!(settlement.postings().iter().all(|p| p.tally().is_none()));
    }

    #[test]
    fn test_apply_closes_record_once() {
        use crate::economy::{Identity, Ledger, MatchRecord, MemoryLedger};
        use chrono::Utc;

        let ledger = MemoryLedger::new(100);
        ledger.ensure_participant(10, "alice").unwrap();
        ledger.ensure_participant(20, "bob").unwrap();
        let mut game = Match::create(1, 10, 50, false, Some(20));
        let stakes = [stake(10, 50, 1), stake(20, 50, 1)];
        ledger
            .open_match(&MatchRecord::opened(&game, Utc::now().naive_utc()), &stakes)
            .unwrap();
        finish(&mut game, &A_WINS);

        let settlement = Settlement::for_match(&game).unwrap();
        settlement.apply(&ledger).unwrap();
        let again = settlement.apply(&ledger);
        assert!(matches!(again, Err(LedgerError::MatchClosed { id: 1, .. })));
        assert_eq!(ledger.balance(10).unwrap(), 150);
        assert_eq!(ledger.balance(20).unwrap(), 50);
        let record = ledger.match_record(1).unwrap().unwrap();
        assert_eq!(*record.status(), MatchStatus::Completed);
        assert_eq!(*record.outcome(), Some(Outcome::WinnerA));
    }
}
