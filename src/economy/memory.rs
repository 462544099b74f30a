//! In-process ledger for tests and throwaway sessions.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::ledger::{
    GameOutcome, Identity, Ledger, LedgerError, Posting, Standing, Transaction, TransactionId,
    TransactionKind, TransactionStatus,
};
use super::record::{MatchBook, MatchRecord, MatchStatus};
use crate::games::tictactoe::{MatchId, Outcome, ParticipantId};

#[derive(Debug, Clone)]
struct Account {
    display_name: String,
    points: i64,
    wins: i32,
    losses: i32,
    draws: i32,
    is_admin: bool,
    banned: bool,
}

impl Account {
    fn standing(&self, participant: ParticipantId) -> Standing {
        Standing::new(
            participant,
            self.display_name.clone(),
            self.points,
            self.wins,
            self.losses,
            self.draws,
        )
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<ParticipantId, Account>,
    transactions: Vec<Transaction>,
    matches: BTreeMap<MatchId, MatchRecord>,
}

impl State {
    fn require_seated(
        &self,
        participants: impl IntoIterator<Item = ParticipantId>,
    ) -> Result<(), LedgerError> {
        match participants
            .into_iter()
            .find(|p| !self.accounts.contains_key(p))
        {
            Some(missing) => Err(LedgerError::UnknownParticipant(missing)),
            None => Ok(()),
        }
    }

    /// Applies `postings` to staged copies of the touched accounts and only
    /// commits if every posting succeeds.
    fn apply(&mut self, postings: &[Posting]) -> Result<Vec<TransactionId>, LedgerError> {
        let mut staged: HashMap<ParticipantId, Account> = HashMap::new();
        let mut records = Vec::with_capacity(postings.len());
        let now = Utc::now().naive_utc();

        for posting in postings {
            let participant = *posting.participant();
            if !staged.contains_key(&participant) {
                let account = self
                    .accounts
                    .get(&participant)
                    .cloned()
                    .ok_or(LedgerError::UnknownParticipant(participant))?;
                staged.insert(participant, account);
            }
            let account = staged
                .get_mut(&participant)
                .ok_or(LedgerError::UnknownParticipant(participant))?;

            let balance = account.points;
            account.points = posting.next_balance(balance).inspect_err(|e| {
                warn!(participant, balance, error = %e, "Posting refused");
            })?;
            match posting.tally() {
                Some(GameOutcome::Win) => account.wins += 1,
                Some(GameOutcome::Loss) => account.losses += 1,
                Some(GameOutcome::Draw) => account.draws += 1,
                None => {}
            }

            let id = (self.transactions.len() + records.len() + 1) as TransactionId;
            let processed_at = (*posting.status() != TransactionStatus::Pending).then_some(now);
            records.push(Transaction::new(
                id,
                participant,
                *posting.amount(),
                *posting.kind(),
                *posting.status(),
                posting.method().clone(),
                posting.detail().clone(),
                *posting.match_id(),
                now,
                processed_at,
            ));
        }

        let ids = records.iter().map(|t| *t.id()).collect();
        self.accounts.extend(staged);
        self.transactions.extend(records);
        Ok(ids)
    }
}

/// Ledger and participant directory kept in memory.
#[derive(Debug)]
pub struct MemoryLedger {
    initial_points: i64,
    state: Mutex<State>,
}

impl MemoryLedger {
    /// Creates an empty ledger granting `initial_points` to new participants.
    #[instrument]
    pub fn new(initial_points: i64) -> Self {
        info!("Creating in-memory ledger");
        Self {
            initial_points,
            state: Mutex::new(State::default()),
        }
    }

    /// Sets the admin flag, creating the participant if needed.
    #[instrument(skip(self))]
    pub fn set_admin(&self, participant: ParticipantId, is_admin: bool) {
        let mut state = self.state.lock();
        let initial_points = self.initial_points;
        state
            .accounts
            .entry(participant)
            .or_insert_with(|| new_account(participant, initial_points))
            .is_admin = is_admin;
    }

    /// Sets the banned flag of a known participant.
    #[instrument(skip(self))]
    pub fn set_banned(&self, participant: ParticipantId, banned: bool) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let account = state
            .accounts
            .get_mut(&participant)
            .ok_or(LedgerError::UnknownParticipant(participant))?;
        account.banned = banned;
        Ok(())
    }

    /// Sum of all balances.
    pub fn total_points(&self) -> i64 {
        self.state.lock().accounts.values().map(|a| a.points).sum()
    }

    /// Every record, oldest first.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.clone()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(100)
    }
}

fn new_account(participant: ParticipantId, points: i64) -> Account {
    Account {
        display_name: participant.to_string(),
        points,
        wins: 0,
        losses: 0,
        draws: 0,
        is_admin: false,
        banned: false,
    }
}

impl Ledger for MemoryLedger {
    fn balance(&self, participant: ParticipantId) -> Result<i64, LedgerError> {
        self.state
            .lock()
            .accounts
            .get(&participant)
            .map(|a| a.points)
            .ok_or(LedgerError::UnknownParticipant(participant))
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .find(|t| *t.id() == id)
            .cloned())
    }

    fn pending(&self, kind: TransactionKind) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .filter(|t| *t.kind() == kind && *t.status() == TransactionStatus::Pending)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, postings), fields(count = postings.len()))]
    fn post(&self, postings: &[Posting]) -> Result<Vec<TransactionId>, LedgerError> {
        let ids = self.state.lock().apply(postings)?;
        debug!(?ids, "Postings applied");
        Ok(ids)
    }

    #[instrument(skip(self, follow_up))]
    fn resolve(
        &self,
        id: TransactionId,
        kind: Option<TransactionKind>,
        status: TransactionStatus,
        follow_up: &[Posting],
    ) -> Result<Transaction, LedgerError> {
        let mut state = self.state.lock();
        let index = state
            .transactions
            .iter()
            .position(|t| *t.id() == id)
            .ok_or(LedgerError::TransactionNotFound(id))?;

        let current = &state.transactions[index];
        if *current.status() != TransactionStatus::Pending
            || kind.is_some_and(|k| k != *current.kind())
        {
            return Err(LedgerError::InvalidTransactionState {
                id,
                kind: *current.kind(),
                status: *current.status(),
            });
        }

        state.apply(follow_up)?;

        let current = &state.transactions[index];
        let resolved = Transaction::new(
            id,
            *current.participant(),
            *current.amount(),
            *current.kind(),
            status,
            current.method().clone(),
            current.detail().clone(),
            *current.match_id(),
            *current.created_at(),
            Some(Utc::now().naive_utc()),
        );
        state.transactions[index] = resolved.clone();
        info!(id, %status, "Transaction resolved");
        Ok(resolved)
    }
}

impl Identity for MemoryLedger {
    #[instrument(skip(self))]
    fn ensure_participant(
        &self,
        participant: ParticipantId,
        display_name: &str,
    ) -> Result<Standing, LedgerError> {
        let mut state = self.state.lock();
        let initial_points = self.initial_points;
        let account = state.accounts.entry(participant).or_insert_with(|| {
            info!(participant, "Participant created");
            new_account(participant, initial_points)
        });
        account.display_name = display_name.to_string();
        Ok(account.standing(participant))
    }

    fn standing(&self, participant: ParticipantId) -> Result<Option<Standing>, LedgerError> {
        Ok(self
            .state
            .lock()
            .accounts
            .get(&participant)
            .map(|a| a.standing(participant)))
    }

    fn is_admin(&self, participant: ParticipantId) -> Result<bool, LedgerError> {
        Ok(self
            .state
            .lock()
            .accounts
            .get(&participant)
            .is_some_and(|a| a.is_admin))
    }

    fn leaderboard(&self, limit: usize) -> Result<Vec<Standing>, LedgerError> {
        let state = self.state.lock();
        let mut standings: Vec<Standing> = state
            .accounts
            .iter()
            .filter(|(_, a)| !a.banned)
            .map(|(id, a)| a.standing(*id))
            .collect();
        standings.sort_by(|a, b| {
            b.points()
                .cmp(a.points())
                .then(a.participant().cmp(b.participant()))
        });
        standings.truncate(limit);
        Ok(standings)
    }
}

impl MatchBook for MemoryLedger {
    #[instrument(skip(self, record, stakes), fields(match_id = record.id()))]
    fn open_match(&self, record: &MatchRecord, stakes: &[Posting]) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.matches.get(record.id()) {
            return Err(LedgerError::MatchClosed {
                id: *record.id(),
                status: *existing.status(),
            });
        }
        state.require_seated(std::iter::once(*record.seat_a()).chain(*record.seat_b()))?;
        state.apply(stakes)?;
        state.matches.insert(*record.id(), record.clone());
        debug!("Match recorded");
        Ok(())
    }

    #[instrument(skip(self, stakes))]
    fn seat_match(
        &self,
        id: MatchId,
        participant: ParticipantId,
        stakes: &[Posting],
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let mut record = state
            .matches
            .get(&id)
            .cloned()
            .ok_or(LedgerError::UnknownMatch(id))?;
        state.require_seated([participant])?;
        record.seat(participant)?;
        state.apply(stakes)?;
        state.matches.insert(id, record);
        Ok(())
    }

    #[instrument(skip(self, postings), fields(count = postings.len()))]
    fn close_match(
        &self,
        id: MatchId,
        status: MatchStatus,
        outcome: Option<Outcome>,
        postings: &[Posting],
    ) -> Result<Vec<TransactionId>, LedgerError> {
        let mut state = self.state.lock();
        let mut record = state
            .matches
            .get(&id)
            .cloned()
            .ok_or(LedgerError::UnknownMatch(id))?;
        record.close(status, outcome, Utc::now().naive_utc())?;
        let ids = state.apply(postings)?;
        state.matches.insert(id, record);
        info!(%status, "Match closed");
        Ok(ids)
    }

    fn match_record(&self, id: MatchId) -> Result<Option<MatchRecord>, LedgerError> {
        Ok(self.state.lock().matches.get(&id).cloned())
    }

    fn unfinished_matches(&self) -> Result<Vec<MatchRecord>, LedgerError> {
        Ok(self
            .state
            .lock()
            .matches
            .values()
            .filter(|r| r.status().is_open())
            .cloned()
            .collect())
    }

    fn last_match_id(&self) -> Result<Option<MatchId>, LedgerError> {
        Ok(self.state.lock().matches.keys().next_back().copied())
    }
}
