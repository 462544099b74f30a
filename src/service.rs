//! Core operations consumed by the dispatcher.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::EconomyConfig;
use crate::economy::{LedgerError, MatchBook, MatchRecord, MatchStatus, Posting, Settlement, stake};
use crate::error::ArenaError;
use crate::games::tictactoe::{Adversary, Match, MatchId, MatchView, ParticipantId, SeatError};
use crate::session::MatchRegistry;

/// Match lifecycle over a registry and a ledger.
///
/// Wagers are escrowed when a human takes a seat and released by
/// [`settle`](Self::settle) or [`cancel_match`](Self::cancel_match). A
/// match leaves the registry only once its settlement is applied. Every
/// escrow step also updates the match's stored record, so
/// [`recover`](Self::recover) can refund matches a previous process left
/// unfinished.
#[derive(Debug)]
pub struct ArenaService<L> {
    registry: MatchRegistry,
    ledger: Arc<L>,
    adversary: Adversary,
    min_bet: i64,
    max_bet: i64,
}

impl<L: MatchBook> ArenaService<L> {
    /// Creates a service with bet limits and engine settings from `config`.
    #[instrument(skip(ledger, config))]
    pub fn new(ledger: Arc<L>, config: &EconomyConfig) -> Self {
        info!(
            min_bet = config.min_bet(),
            max_bet = config.max_bet(),
            "Creating ArenaService"
        );
        Self {
            registry: MatchRegistry::new(),
            ledger,
            adversary: Adversary::new(*config.bot_randomness()),
            min_bet: *config.min_bet(),
            max_bet: *config.max_bet(),
        }
    }

    /// Replaces the engine.
    pub fn with_adversary(mut self, adversary: Adversary) -> Self {
        self.adversary = adversary;
        self
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// The match registry.
    pub fn registry(&self) -> &MatchRegistry {
        &self.registry
    }

    /// Opens a match and escrows the creator's wager.
    ///
    /// # Errors
    ///
    /// [`ArenaError::WagerOutOfRange`] outside the bet limits, and
    /// [`LedgerError::InsufficientBalance`](crate::LedgerError::InsufficientBalance)
    /// if the creator cannot cover the wager. Nothing is registered on
    /// failure.
    #[instrument(skip(self))]
    pub fn create_match(
        &self,
        creator: ParticipantId,
        wager: i64,
        vs_bot: bool,
    ) -> Result<MatchView, ArenaError> {
        self.check_wager(wager)?;

        let id = self.registry.next_id();
        let game = Match::create(id, creator, wager, vs_bot, None);
        let record = MatchRecord::opened(&game, Utc::now().naive_utc());
        self.ledger.open_match(&record, &stakes(creator, wager, id))?;

        let view = self.registry.insert(game);
        info!(match_id = id, "Match opened");
        Ok(view)
    }

    /// Seats `participant` as the second player and escrows their wager.
    ///
    /// The seat check, the hold and the seating happen under the match
    /// lock, so two joiners cannot both be charged.
    ///
    /// # Errors
    ///
    /// [`ArenaError::MatchFull`] for started or bot matches,
    /// [`ArenaError::AlreadyInMatch`] for the creator, and ledger errors
    /// from the hold.
    #[instrument(skip(self))]
    pub fn join_match(
        &self,
        id: MatchId,
        participant: ParticipantId,
    ) -> Result<MatchView, ArenaError> {
        self.registry
            .with_match(id, |game| -> Result<MatchView, ArenaError> {
                game.check_join(participant).map_err(|e| seat_error(id, e))?;
                self.ledger
                    .seat_match(id, participant, &stakes(participant, game.wager(), id))?;
                game.join(participant).map_err(|e| seat_error(id, e))?;
                info!(match_id = id, participant, "Match joined");
                Ok(game.view())
            })
            .ok_or(ArenaError::MatchNotFound(id))?
    }

    /// Cancels a match still waiting for its second player, refunds the
    /// creator and evicts the match.
    ///
    /// # Errors
    ///
    /// [`ArenaError::Unauthorized`] unless `actor` created the match,
    /// [`ArenaError::NotCancellable`] once an opponent joined. If the
    /// refund fails the match stays registered as over and unsettled, and
    /// [`settle`](Self::settle) retries it.
    #[instrument(skip(self))]
    pub fn cancel_match(
        &self,
        id: MatchId,
        actor: ParticipantId,
    ) -> Result<MatchView, ArenaError> {
        self.registry
            .with_match(id, |game| -> Result<MatchView, ArenaError> {
                if game.seat_a() != actor {
                    warn!(match_id = id, actor, "Cancel by non-creator");
                    return Err(ArenaError::Unauthorized);
                }
                game.cancel().map_err(|e| seat_error(id, e))?;
                self.settle_locked(game)?;
                Ok(game.view())
            })
            .ok_or(ArenaError::MatchNotFound(id))?
    }

    /// Plays `actor`'s move at board index `position`.
    ///
    /// # Errors
    ///
    /// [`ArenaError::NotAParticipant`] if `actor` holds no seat, otherwise
    /// the [`MoveError`](crate::MoveError) raised by the match.
    #[instrument(skip(self))]
    pub fn submit_move(
        &self,
        id: MatchId,
        actor: ParticipantId,
        position: usize,
    ) -> Result<MatchView, ArenaError> {
        self.registry
            .with_match(id, |game| -> Result<MatchView, ArenaError> {
                let seat = game.seat_of(actor).ok_or(ArenaError::NotAParticipant(id))?;
                game.submit_move(seat, position).inspect_err(|e| {
                    warn!(match_id = id, actor, position, error = %e, "Move rejected");
                })?;
                Ok(game.view())
            })
            .ok_or(ArenaError::MatchNotFound(id))?
    }

    /// Lets the engine move in a bot match. Returns the chosen index.
    ///
    /// # Errors
    ///
    /// [`MoveError::NotApplicable`](crate::MoveError::NotApplicable) unless it
    /// is the engine's turn.
    #[instrument(skip(self))]
    pub fn request_bot_move(&self, id: MatchId) -> Result<(usize, MatchView), ArenaError> {
        let adversary = self.adversary;
        self.registry
            .with_match(id, |game| -> Result<(usize, MatchView), ArenaError> {
                let (position, _) = game.request_bot_move(&adversary, &mut rand::thread_rng())?;
                debug!(match_id = id, position, "Engine replied");
                Ok((position, game.view()))
            })
            .ok_or(ArenaError::MatchNotFound(id))?
    }

    /// Applies the settlement of a finished match and evicts it.
    ///
    /// Runs at most once per match: a second call finds no match.
    ///
    /// # Errors
    ///
    /// [`ArenaError::MatchNotOver`] while the match is in play. A ledger
    /// failure leaves the match registered and over so the call can be
    /// repeated.
    #[instrument(skip(self))]
    pub fn settle(&self, id: MatchId) -> Result<Settlement, ArenaError> {
        self.registry
            .with_match(id, |game| self.settle_locked(game))
            .ok_or(ArenaError::MatchNotFound(id))?
    }

    /// Snapshot of an active match.
    ///
    /// # Errors
    ///
    /// [`ArenaError::MatchNotFound`] for unknown or evicted matches.
    pub fn view(&self, id: MatchId) -> Result<MatchView, ArenaError> {
        self.registry.view(id).ok_or(ArenaError::MatchNotFound(id))
    }

    /// Matches waiting for an opponent.
    pub fn open_matches(&self) -> Vec<MatchView> {
        self.registry.open_matches()
    }

    /// Stored record of a match, settled or not.
    ///
    /// # Errors
    ///
    /// Ledger errors from the lookup.
    pub fn match_record(&self, id: MatchId) -> Result<Option<MatchRecord>, ArenaError> {
        Ok(self.ledger.match_record(id)?)
    }

    /// Reconciles the registry with the stored match records. Run once
    /// before serving.
    ///
    /// New identifiers continue after the highest stored match. Every
    /// unfinished record this registry does not hold belonged to a process
    /// that is gone: it is closed as abandoned and its stakes refunded.
    /// Returns the abandoned identifiers.
    ///
    /// # Errors
    ///
    /// Ledger errors. Matches abandoned before the failure stay abandoned
    /// and a second call picks up the rest.
    #[instrument(skip(self))]
    pub fn recover(&self) -> Result<Vec<MatchId>, ArenaError> {
        if let Some(last) = self.ledger.last_match_id()? {
            self.registry.advance_past(last);
        }

        let mut abandoned = Vec::new();
        for record in self.ledger.unfinished_matches()? {
            let id = *record.id();
            if self.registry.contains(id) {
                continue;
            }
            match self
                .ledger
                .close_match(id, MatchStatus::Abandoned, None, &record.refunds())
            {
                Ok(_) => {
                    warn!(match_id = id, wager = record.wager(), "Abandoned match refunded");
                    abandoned.push(id);
                }
                Err(LedgerError::MatchClosed { status, .. }) => {
                    debug!(match_id = id, %status, "Match closed meanwhile");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(count = abandoned.len(), "Recovery complete");
        Ok(abandoned)
    }

    fn settle_locked(&self, game: &Match) -> Result<Settlement, ArenaError> {
        let id = game.id();
        let settlement = Settlement::for_match(game).ok_or(ArenaError::MatchNotOver(id))?;
        if let Err(e) = settlement.apply(&*self.ledger) {
            // A closed record has nothing left to settle.
            if matches!(e, LedgerError::MatchClosed { .. }) {
                self.registry.remove(id);
            }
            return Err(e.into());
        }
        self.registry.remove(id);
        info!(match_id = id, outcome = %settlement.outcome(), "Match settled");
        Ok(settlement)
    }

    fn check_wager(&self, wager: i64) -> Result<(), ArenaError> {
        if wager < 0 || wager < self.min_bet || wager > self.max_bet {
            warn!(wager, min = self.min_bet, max = self.max_bet, "Wager out of range");
            return Err(ArenaError::WagerOutOfRange {
                wager,
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        Ok(())
    }
}

/// Escrow postings for one seat; none for free matches.
fn stakes(participant: ParticipantId, wager: i64, id: MatchId) -> Vec<Posting> {
    if wager > 0 {
        vec![stake(participant, wager, id)]
    } else {
        Vec::new()
    }
}

fn seat_error(id: MatchId, err: SeatError) -> ArenaError {
    match err {
        SeatError::Full | SeatError::BotMatch => ArenaError::MatchFull(id),
        SeatError::OwnMatch => ArenaError::AlreadyInMatch(id),
        SeatError::NotCancellable => ArenaError::NotCancellable(id),
    }
}
