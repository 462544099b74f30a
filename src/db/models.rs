//! Database models and their mapping onto ledger types.

use std::str::FromStr;

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;

use crate::db::{DbError, DbStage, schema};
use crate::economy::{
    MatchRecord, MatchStatus, Posting, Standing, Transaction, TransactionKind, TransactionStatus,
};
use crate::games::tictactoe::Outcome;

/// Participant row.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::participants)]
pub struct ParticipantRow {
    id: i64,
    display_name: String,
    points: i64,
    wins: i32,
    losses: i32,
    draws: i32,
    is_admin: bool,
    banned: bool,
    created_at: NaiveDateTime,
    last_active: NaiveDateTime,
}

impl ParticipantRow {
    /// Balance and statistics view.
    pub fn standing(&self) -> Standing {
        Standing::new(
            self.id,
            self.display_name.clone(),
            self.points,
            self.wins,
            self.losses,
            self.draws,
        )
    }
}

/// Insertable participant.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::participants)]
pub struct NewParticipant {
    id: i64,
    display_name: String,
    points: i64,
}

/// Transaction row.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = schema::transactions)]
#[diesel(belongs_to(ParticipantRow, foreign_key = participant_id))]
pub struct TransactionRow {
    id: i32,
    participant_id: i64,
    amount: i64,
    kind: String,
    status: String,
    payment_method: Option<String>,
    detail: Option<String>,
    match_id: Option<i64>,
    created_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
}

impl TransactionRow {
    /// Parses the stored strings into a ledger [`Transaction`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if `kind` or `status` hold an unknown value.
    pub fn into_transaction(self) -> Result<Transaction, DbError> {
        let kind = TransactionKind::from_str(&self.kind).map_err(|_| {
            DbError::at(DbStage::Decode, format!("Invalid transaction kind: '{}'", self.kind))
        })?;
        let status = TransactionStatus::from_str(&self.status).map_err(|_| {
            DbError::at(DbStage::Decode, format!("Invalid transaction status: '{}'", self.status))
        })?;

        Ok(Transaction::new(
            self.id,
            self.participant_id,
            self.amount,
            kind,
            status,
            self.payment_method,
            self.detail,
            self.match_id.map(|id| id as u64),
            self.created_at,
            self.processed_at,
        ))
    }
}

/// Insertable transaction.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::transactions)]
pub struct NewTransactionRow {
    participant_id: i64,
    amount: i64,
    kind: String,
    status: String,
    payment_method: Option<String>,
    detail: Option<String>,
    match_id: Option<i64>,
    created_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
}

impl NewTransactionRow {
    /// Row for `posting`, stamped `now`. Non-pending records are processed
    /// on creation.
    pub fn from_posting(posting: &Posting, now: NaiveDateTime) -> Self {
        let processed_at = (*posting.status() != TransactionStatus::Pending).then_some(now);
        Self {
            participant_id: *posting.participant(),
            amount: *posting.amount(),
            kind: posting.kind().to_string(),
            status: posting.status().to_string(),
            payment_method: posting.method().clone(),
            detail: posting.detail().clone(),
            match_id: posting.match_id().map(|id| id as i64),
            created_at: now,
            processed_at,
        }
    }
}

/// Match row. Ids are stored as `BIGINT`.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::matches)]
pub struct MatchRow {
    id: i64,
    seat_a: i64,
    seat_b: Option<i64>,
    wager: i64,
    vs_bot: bool,
    status: String,
    outcome: Option<String>,
    created_at: NaiveDateTime,
    completed_at: Option<NaiveDateTime>,
}

impl MatchRow {
    /// Parses the stored strings into a [`MatchRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if `status` or `outcome` hold an unknown value.
    pub fn into_record(self) -> Result<MatchRecord, DbError> {
        let status = MatchStatus::from_str(&self.status).map_err(|_| {
            DbError::at(DbStage::Decode, format!("Invalid match status: '{}'", self.status))
        })?;
        let outcome = self
            .outcome
            .as_deref()
            .map(|raw| {
                Outcome::from_str(raw).map_err(|_| {
                    DbError::at(DbStage::Decode, format!("Invalid match outcome: '{}'", raw))
                })
            })
            .transpose()?;

        Ok(MatchRecord::new(
            self.id as u64,
            self.seat_a,
            self.seat_b,
            self.wager,
            self.vs_bot,
            status,
            outcome,
            self.created_at,
            self.completed_at,
        ))
    }
}

impl From<&MatchRecord> for MatchRow {
    fn from(record: &MatchRecord) -> Self {
        Self {
            id: *record.id() as i64,
            seat_a: *record.seat_a(),
            seat_b: *record.seat_b(),
            wager: *record.wager(),
            vs_bot: *record.vs_bot(),
            status: record.status().to_string(),
            outcome: record.outcome().map(|o| o.to_string()),
            created_at: *record.created_at(),
            completed_at: *record.completed_at(),
        }
    }
}
