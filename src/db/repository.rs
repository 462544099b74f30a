//! SQLite-backed ledger and participant directory.

use chrono::Utc;
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use tracing::{debug, info, instrument, warn};

use crate::db::models::{
    MatchRow, NewParticipant, NewTransactionRow, ParticipantRow, TransactionRow,
};
use crate::db::{DbError, DbStage, MIGRATIONS, schema};
use crate::economy::{
    GameOutcome, Identity, Ledger, LedgerError, MatchBook, MatchRecord, MatchStatus, Posting,
    Standing, Transaction, TransactionId, TransactionKind, TransactionStatus,
};
use crate::games::tictactoe::{MatchId, Outcome, ParticipantId};

/// Milliseconds a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Database repository implementing [`Ledger`], [`MatchBook`] and [`Identity`].
///
/// Every write runs in `BEGIN IMMEDIATE`, so a balance read and the debit
/// that depends on it cannot interleave with another writer.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db_path: String,
    initial_points: i64,
}

impl LedgerRepository {
    /// Creates a repository for the database at `db_path`. New
    /// participants start with `initial_points`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the path is empty.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: String, initial_points: i64) -> Result<Self, DbError> {
        if db_path.trim().is_empty() {
            return Err(DbError::at(DbStage::Connect, "Database path is empty"));
        }
        info!(path = %db_path, "Creating LedgerRepository");
        Ok(Self {
            db_path,
            initial_points,
        })
    }

    /// Creates a repository and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the database cannot be opened or migrated.
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn open(db_path: String, initial_points: i64) -> Result<Self, DbError> {
        let repo = Self::new(db_path, initial_points)?;
        repo.run_migrations()?;
        Ok(repo)
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a migration fails.
    #[instrument(skip(self))]
    pub fn run_migrations(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::at(DbStage::Migrate, e.to_string()))?;
        info!(count = applied.len(), "Migrations applied");
        Ok(())
    }

    /// Establishes a database connection.
    #[instrument(skip(self))]
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        let mut conn = SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::at(DbStage::Connect, format!("'{}': {}", self.db_path, e)))?;
        diesel::sql_query(format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .execute(&mut conn)?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        Ok(conn)
    }

    /// Sets the admin flag of an existing participant.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownParticipant`] if the participant does not exist.
    #[instrument(skip(self))]
    pub fn set_admin(
        &self,
        participant: ParticipantId,
        is_admin: bool,
    ) -> Result<(), LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;
        let updated = diesel::update(dsl::participants.find(participant))
            .set(dsl::is_admin.eq(is_admin))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(LedgerError::UnknownParticipant(participant));
        }
        info!(participant, is_admin, "Admin flag updated");
        Ok(())
    }

    /// Sets the banned flag of an existing participant.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownParticipant`] if the participant does not exist.
    #[instrument(skip(self))]
    pub fn set_banned(&self, participant: ParticipantId, banned: bool) -> Result<(), LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;
        let updated = diesel::update(dsl::participants.find(participant))
            .set(dsl::banned.eq(banned))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(LedgerError::UnknownParticipant(participant));
        }
        Ok(())
    }

    /// Transactions of one participant, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on a database error.
    #[instrument(skip(self))]
    pub fn history(&self, participant: ParticipantId) -> Result<Vec<Transaction>, LedgerError> {
        use schema::transactions::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::transactions
            .filter(dsl::participant_id.eq(participant))
            .order(dsl::id.desc())
            .select(TransactionRow::as_select())
            .load(&mut conn)?;
        debug!(count = rows.len(), "History loaded");
        rows.into_iter()
            .map(|row| row.into_transaction().map_err(LedgerError::from))
            .collect()
    }
}

/// Applies postings inside an open transaction.
fn apply_postings(
    conn: &mut SqliteConnection,
    postings: &[Posting],
) -> Result<Vec<TransactionId>, LedgerError> {
    use schema::participants::dsl as p;
    use schema::transactions::dsl as t;

    let now = Utc::now().naive_utc();
    let mut ids = Vec::with_capacity(postings.len());

    for posting in postings {
        let participant = *posting.participant();
        let balance: i64 = p::participants
            .find(participant)
            .select(p::points)
            .first(conn)
            .optional()?
            .ok_or(LedgerError::UnknownParticipant(participant))?;

        // SQLite turns an overflowing integer sum into a REAL, so the new
        // balance is computed here and written as a plain value.
        let next = posting.next_balance(balance).inspect_err(|e| {
            warn!(participant, balance, error = %e, "Posting refused");
        })?;

        if next != balance {
            diesel::update(p::participants.find(participant))
                .set(p::points.eq(next))
                .execute(conn)?;
        }

        let target = p::participants.find(participant);
        match posting.tally() {
            Some(GameOutcome::Win) => {
                diesel::update(target).set(p::wins.eq(p::wins + 1)).execute(conn)?;
            }
            Some(GameOutcome::Loss) => {
                diesel::update(target).set(p::losses.eq(p::losses + 1)).execute(conn)?;
            }
            Some(GameOutcome::Draw) => {
                diesel::update(target).set(p::draws.eq(p::draws + 1)).execute(conn)?;
            }
            None => {}
        }

        let id: TransactionId = diesel::insert_into(t::transactions)
            .values(NewTransactionRow::from_posting(posting, now))
            .returning(t::id)
            .get_result(conn)?;
        ids.push(id);
    }

    Ok(ids)
}

/// Fails unless every participant has a row.
fn require_seated(
    conn: &mut SqliteConnection,
    participants: impl IntoIterator<Item = ParticipantId>,
) -> Result<(), LedgerError> {
    use schema::participants::dsl;
    for participant in participants {
        let found = dsl::participants
            .find(participant)
            .select(dsl::id)
            .first::<i64>(conn)
            .optional()?;
        if found.is_none() {
            return Err(LedgerError::UnknownParticipant(participant));
        }
    }
    Ok(())
}

/// Loads a match row inside an open transaction.
fn load_match(conn: &mut SqliteConnection, id: MatchId) -> Result<MatchRecord, LedgerError> {
    use schema::matches::dsl;
    Ok(dsl::matches
        .find(id as i64)
        .select(MatchRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(LedgerError::UnknownMatch(id))?
        .into_record()?)
}

/// Writes back the mutable columns of a match row.
fn store_match(conn: &mut SqliteConnection, record: &MatchRecord) -> Result<(), LedgerError> {
    use schema::matches::dsl;
    diesel::update(dsl::matches.find(*record.id() as i64))
        .set((
            dsl::seat_b.eq(*record.seat_b()),
            dsl::status.eq(record.status().to_string()),
            dsl::outcome.eq(record.outcome().map(|o| o.to_string())),
            dsl::completed_at.eq(*record.completed_at()),
        ))
        .execute(conn)?;
    Ok(())
}

impl Ledger for LedgerRepository {
    #[instrument(skip(self))]
    fn balance(&self, participant: ParticipantId) -> Result<i64, LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;
        dsl::participants
            .find(participant)
            .select(dsl::points)
            .first(&mut conn)
            .optional()?
            .ok_or(LedgerError::UnknownParticipant(participant))
    }

    #[instrument(skip(self))]
    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        use schema::transactions::dsl;
        let mut conn = self.connection()?;
        let row = dsl::transactions
            .find(id)
            .select(TransactionRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(TransactionRow::into_transaction).transpose()?)
    }

    #[instrument(skip(self))]
    fn pending(&self, kind: TransactionKind) -> Result<Vec<Transaction>, LedgerError> {
        use schema::transactions::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::transactions
            .filter(dsl::kind.eq(kind.to_string()))
            .filter(dsl::status.eq(TransactionStatus::Pending.to_string()))
            .order(dsl::id.asc())
            .select(TransactionRow::as_select())
            .load(&mut conn)?;
        info!(count = rows.len(), "Pending transactions loaded");
        rows.into_iter()
            .map(|row| row.into_transaction().map_err(LedgerError::from))
            .collect()
    }

    #[instrument(skip(self, postings), fields(count = postings.len()))]
    fn post(&self, postings: &[Posting]) -> Result<Vec<TransactionId>, LedgerError> {
        let mut conn = self.connection()?;
        let ids = conn.immediate_transaction(|conn| apply_postings(conn, postings))?;
        info!(?ids, "Postings committed");
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
        use schema::transactions::dsl;
        let mut conn = self.connection()?;

        let resolved = conn.immediate_transaction(|conn| {
            let current = dsl::transactions
                .find(id)
                .select(TransactionRow::as_select())
                .first(conn)
                .optional()?
                .ok_or(LedgerError::TransactionNotFound(id))?
                .into_transaction()?;

            if *current.status() != TransactionStatus::Pending
                || kind.is_some_and(|k| k != *current.kind())
            {
                return Err(LedgerError::InvalidTransactionState {
                    id,
                    kind: *current.kind(),
                    status: *current.status(),
                });
            }

            apply_postings(conn, follow_up)?;

            let row = diesel::update(dsl::transactions.find(id))
                .set((
                    dsl::status.eq(status.to_string()),
                    dsl::processed_at.eq(Some(Utc::now().naive_utc())),
                ))
                .returning(TransactionRow::as_returning())
                .get_result(conn)?;
            Ok(row.into_transaction()?)
        })?;

        info!(id, %status, "Transaction resolved");
        Ok(resolved)
    }
}

impl Identity for LedgerRepository {
    #[instrument(skip(self))]
    fn ensure_participant(
        &self,
        participant: ParticipantId,
        display_name: &str,
    ) -> Result<Standing, LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;

        let row = conn.immediate_transaction(|conn| {
            diesel::insert_into(dsl::participants)
                .values(NewParticipant::new(
                    participant,
                    display_name.to_string(),
                    self.initial_points,
                ))
                .on_conflict(dsl::id)
                .do_update()
                .set((
                    dsl::display_name.eq(display_name),
                    dsl::last_active.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;

            dsl::participants
                .find(participant)
                .select(ParticipantRow::as_select())
                .first(conn)
                .map_err(LedgerError::from)
        })?;

        debug!(participant, points = row.points(), "Participant ensured");
        Ok(row.standing())
    }

    #[instrument(skip(self))]
    fn standing(&self, participant: ParticipantId) -> Result<Option<Standing>, LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;
        let row = dsl::participants
            .find(participant)
            .select(ParticipantRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(|r| r.standing()))
    }

    #[instrument(skip(self))]
    fn is_admin(&self, participant: ParticipantId) -> Result<bool, LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;
        let flag = dsl::participants
            .find(participant)
            .select(dsl::is_admin)
            .first::<bool>(&mut conn)
            .optional()?;
        Ok(flag.unwrap_or(false))
    }

    #[instrument(skip(self))]
    fn leaderboard(&self, limit: usize) -> Result<Vec<Standing>, LedgerError> {
        use schema::participants::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::participants
            .filter(dsl::banned.eq(false))
            .order((dsl::points.desc(), dsl::id.asc()))
            .limit(limit as i64)
            .select(ParticipantRow::as_select())
            .load(&mut conn)?;
        info!(count = rows.len(), "Leaderboard loaded");
        Ok(rows.iter().map(ParticipantRow::standing).collect())
    }
}

impl MatchBook for LedgerRepository {
    #[instrument(skip(self, record, stakes), fields(match_id = record.id()))]
    fn open_match(&self, record: &MatchRecord, stakes: &[Posting]) -> Result<(), LedgerError> {
        use schema::matches::dsl;
        let mut conn = self.connection()?;
        conn.immediate_transaction(|conn| {
            if let Some(existing) = dsl::matches
                .find(*record.id() as i64)
                .select(dsl::status)
                .first::<String>(conn)
                .optional()?
            {
                let status = existing.parse::<MatchStatus>().map_err(|_| {
                    DbError::at(DbStage::Decode, format!("Invalid match status: '{}'", existing))
                })?;
                return Err(LedgerError::MatchClosed {
                    id: *record.id(),
                    status,
                });
            }
            require_seated(conn, std::iter::once(*record.seat_a()).chain(*record.seat_b()))?;
            apply_postings(conn, stakes)?;
            diesel::insert_into(dsl::matches)
                .values(MatchRow::from(record))
                .execute(conn)?;
            Ok(())
        })?;
        info!("Match recorded");
        Ok(())
    }

    #[instrument(skip(self, stakes))]
    fn seat_match(
        &self,
        id: MatchId,
        participant: ParticipantId,
        stakes: &[Posting],
    ) -> Result<(), LedgerError> {
        let mut conn = self.connection()?;
        conn.immediate_transaction(|conn| {
            require_seated(conn, [participant])?;
            let mut record = load_match(conn, id)?;
            record.seat(participant)?;
            apply_postings(conn, stakes)?;
            store_match(conn, &record)
        })?;
        info!("Second seat recorded");
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
        let mut conn = self.connection()?;
        let ids = conn.immediate_transaction(|conn| {
            let mut record = load_match(conn, id)?;
            record.close(status, outcome, Utc::now().naive_utc())?;
            let ids = apply_postings(conn, postings)?;
            store_match(conn, &record)?;
            Ok::<_, LedgerError>(ids)
        })?;
        info!(%status, ?ids, "Match closed");
        Ok(ids)
    }

    #[instrument(skip(self))]
    fn match_record(&self, id: MatchId) -> Result<Option<MatchRecord>, LedgerError> {
        use schema::matches::dsl;
        let mut conn = self.connection()?;
        let row = dsl::matches
            .find(id as i64)
            .select(MatchRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.map(MatchRow::into_record).transpose()?)
    }

    #[instrument(skip(self))]
    fn unfinished_matches(&self) -> Result<Vec<MatchRecord>, LedgerError> {
        use schema::matches::dsl;
        let mut conn = self.connection()?;
        let rows = dsl::matches
            .filter(dsl::status.eq_any(vec![
                MatchStatus::Pending.to_string(),
                MatchStatus::Active.to_string(),
            ]))
            .order(dsl::id.asc())
            .select(MatchRow::as_select())
            .load(&mut conn)?;
        info!(count = rows.len(), "Unfinished matches loaded");
        rows.into_iter()
            .map(|row| row.into_record().map_err(LedgerError::from))
            .collect()
    }

    #[instrument(skip(self))]
    fn last_match_id(&self) -> Result<Option<MatchId>, LedgerError> {
        use diesel::dsl::max;
        use schema::matches::dsl;
        let mut conn = self.connection()?;
        let last: Option<i64> = dsl::matches.select(max(dsl::id)).first(&mut conn)?;
        Ok(last.map(|id| id as u64))
    }
}
