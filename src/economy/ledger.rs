//! Ledger collaborator: balances, transaction records, participants.
//!
//! Implementations provide two atomic primitives, [`Ledger::post`] and
//! [`Ledger::resolve`]. Everything else the core needs (transfers, holds,
//! status changes) is expressed through them, so every balance change is
//! all-or-nothing and validate-then-debit never races.

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};

use super::record::MatchStatus;
use crate::db::DbError;
use crate::games::tictactoe::{MatchId, ParticipantId};

/// Identifier of a transaction record.
pub type TransactionId = i32;

/// What a transaction record accounts for.
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
pub enum TransactionKind {
    /// Points bought in.
    Deposit,
    /// Points cashed out (held at request time).
    Withdrawal,
    /// Wager escrowed for a match.
    Bet,
    /// Points won from an opponent.
    Win,
    /// Points lost to an opponent or the engine.
    Loss,
    /// Direct transfer between participants.
    Transfer,
    /// Fee charged on an approved withdrawal.
    Fee,
    /// Manual or automatic correction, including stake refunds.
    Adjustment,
}

/// Lifecycle state of a transaction record.
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
pub enum TransactionStatus {
    /// Awaiting an admin decision.
    Pending,
    /// Final and applied.
    Completed,
    /// Refused by an admin.
    Rejected,
}

/// Game result from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameOutcome {
    /// Participant won.
    Win,
    /// Participant lost.
    Loss,
    /// Match drawn.
    Draw,
}

/// How a posting touches the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceEffect {
    /// Add `amount` to the balance.
    #[default]
    Apply,
    /// Add `amount`, failing the whole batch if the balance would go negative.
    RequireFunds,
    /// Write the record only; the balance is untouched.
    RecordOnly,
}

/// One line of an atomic batch: a transaction record plus its effects.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters)]
#[setters(prefix = "with_")]
pub struct Posting {
    #[setters(skip)]
    participant: ParticipantId,
    /// Signed amount; negative debits.
    #[setters(skip)]
    amount: i64,
    #[setters(skip)]
    kind: TransactionKind,
    status: TransactionStatus,
    #[setters(strip_option, into)]
    method: Option<String>,
    #[setters(strip_option, into)]
    detail: Option<String>,
    #[setters(strip_option)]
    match_id: Option<MatchId>,
    effect: BalanceEffect,
    /// Statistics counter bumped in the same transaction.
    #[setters(strip_option)]
    tally: Option<GameOutcome>,
}

impl Posting {
    /// A completed posting that applies `amount` to the balance.
    pub fn new(participant: ParticipantId, amount: i64, kind: TransactionKind) -> Self {
        Self {
            participant,
            amount,
            kind,
            status: TransactionStatus::Completed,
            method: None,
            detail: None,
            match_id: None,
            effect: BalanceEffect::Apply,
            tally: None,
        }
    }

    /// Balance change this posting causes.
    pub fn balance_delta(&self) -> i64 {
        match self.effect {
            BalanceEffect::Apply | BalanceEffect::RequireFunds => self.amount,
            BalanceEffect::RecordOnly => 0,
        }
    }

    /// Balance after applying this posting to `balance`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::BalanceOverflow`] if the sum does not fit, and
    /// [`LedgerError::InsufficientBalance`] if a funds-checked posting
    /// would leave it negative.
    pub fn next_balance(&self, balance: i64) -> Result<i64, LedgerError> {
        let delta = self.balance_delta();
        let next = balance
            .checked_add(delta)
            .ok_or(LedgerError::BalanceOverflow {
                participant: self.participant,
                balance,
                delta,
            })?;
        if self.effect == BalanceEffect::RequireFunds && next < 0 {
            return Err(LedgerError::InsufficientBalance {
                participant: self.participant,
                balance,
                requested: delta.saturating_neg(),
            });
        }
        Ok(next)
    }
}

/// A stored transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize, derive_new::new)]
pub struct Transaction {
    id: TransactionId,
    participant: ParticipantId,
    amount: i64,
    kind: TransactionKind,
    status: TransactionStatus,
    method: Option<String>,
    detail: Option<String>,
    match_id: Option<MatchId>,
    created_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
}

/// Balance and record of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize, derive_new::new)]
pub struct Standing {
    participant: ParticipantId,
    display_name: String,
    points: i64,
    wins: i32,
    losses: i32,
    draws: i32,
}

/// Ledger failure.
#[derive(Debug, Clone, derive_more::Display)]
pub enum LedgerError {
    /// A funds-checked posting would overdraw the balance.
    #[display(
        "Insufficient balance: participant {} has {}, needs {}",
        participant,
        balance,
        requested
    )]
    InsufficientBalance {
        /// Participant being debited.
        participant: ParticipantId,
        /// Balance before the debit.
        balance: i64,
        /// Amount requested.
        requested: i64,
    },

    /// The posting would push the balance past what an `i64` holds.
    #[display(
        "Balance overflow: participant {} has {}, cannot add {}",
        participant,
        balance,
        delta
    )]
    BalanceOverflow {
        /// Participant being credited or debited.
        participant: ParticipantId,
        /// Balance before the posting.
        balance: i64,
        /// Change that did not fit.
        delta: i64,
    },

    /// No such participant.
    #[display("Unknown participant {}", _0)]
    UnknownParticipant(ParticipantId),

    /// No stored record for this match.
    #[display("Unknown match #{}", _0)]
    UnknownMatch(MatchId),

    /// The stored match no longer accepts this change.
    #[display("Match #{} is already {}", id, status)]
    MatchClosed {
        /// Match id.
        id: MatchId,
        /// Its stored status.
        status: MatchStatus,
    },

    /// No such transaction.
    #[display("Transaction #{} not found", _0)]
    TransactionNotFound(TransactionId),

    /// The record is not a pending record of the expected kind.
    #[display("Transaction #{} is a {} {}, not a pending request", id, status, kind)]
    InvalidTransactionState {
        /// Record id.
        id: TransactionId,
        /// Its kind.
        kind: TransactionKind,
        /// Its status.
        status: TransactionStatus,
    },

    /// Storage failed.
    #[display("Ledger unavailable: {}", _0)]
    Unavailable(DbError),
}

impl std::error::Error for LedgerError {}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        Self::Unavailable(err)
    }
}

impl From<diesel::result::Error> for LedgerError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        Self::Unavailable(DbError::from(err))
    }
}

/// Points storage consumed by settlement and the payment pipeline.
pub trait Ledger: Send + Sync {
    /// Current balance.
    fn balance(&self, participant: ParticipantId) -> Result<i64, LedgerError>;

    /// Looks up a record.
    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    /// Pending records of `kind`, oldest first.
    fn pending(&self, kind: TransactionKind) -> Result<Vec<Transaction>, LedgerError>;

    /// Applies every posting in order, all or nothing, returning the new
    /// record ids in the same order.
    fn post(&self, postings: &[Posting]) -> Result<Vec<TransactionId>, LedgerError>;

    /// Moves a pending record to `status` and applies `follow_up`, all or
    /// nothing.
    ///
    /// Fails with [`LedgerError::InvalidTransactionState`] if the record is
    /// not pending or, when `kind` is given, not of that kind.
    fn resolve(
        &self,
        id: TransactionId,
        kind: Option<TransactionKind>,
        status: TransactionStatus,
        follow_up: &[Posting],
    ) -> Result<Transaction, LedgerError>;

    /// Records `posting` and applies its balance effect.
    fn record_transaction(&self, posting: Posting) -> Result<TransactionId, LedgerError> {
        let ids = self.post(std::slice::from_ref(&posting))?;
        ids.first()
            .copied()
            .ok_or_else(|| LedgerError::Unavailable(DbError::new("post returned no id")))
    }

    /// Adds `delta` to the balance as an adjustment record.
    fn adjust_balance(
        &self,
        participant: ParticipantId,
        delta: i64,
    ) -> Result<TransactionId, LedgerError> {
        self.record_transaction(Posting::new(participant, delta, TransactionKind::Adjustment))
    }

    /// Moves `amount` from `from` to `to` in one atomic batch.
    fn transfer(
        &self,
        from: ParticipantId,
        to: ParticipantId,
        amount: i64,
    ) -> Result<(), LedgerError> {
        self.post(&[
            Posting::new(from, -amount, TransactionKind::Transfer)
                .with_effect(BalanceEffect::RequireFunds)
                .with_detail(format!("Transfer to {}", to)),
            Posting::new(to, amount, TransactionKind::Transfer)
                .with_detail(format!("Transfer from {}", from)),
        ])
        .map(|_| ())
    }

    /// Moves a pending record to `status` with no other effect.
    fn set_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, LedgerError> {
        self.resolve(id, None, status, &[])
    }
}

/// Participant directory consumed by the dispatcher.
pub trait Identity: Send + Sync {
    /// Creates the participant with the starting balance if unseen,
    /// otherwise refreshes the display name.
    fn ensure_participant(
        &self,
        participant: ParticipantId,
        display_name: &str,
    ) -> Result<Standing, LedgerError>;

    /// Balance and statistics.
    fn standing(&self, participant: ParticipantId) -> Result<Option<Standing>, LedgerError>;

    /// Admin privilege flag; unknown participants are not admins.
    fn is_admin(&self, participant: ParticipantId) -> Result<bool, LedgerError>;

    /// Top `limit` non-banned participants by points.
    fn leaderboard(&self, limit: usize) -> Result<Vec<Standing>, LedgerError>;
}

/// Accepted payment methods.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumString,
)]
pub enum PaymentMethod {
    /// PayPal.
    #[strum(serialize = "paypal")]
    PayPal,
    /// Vodafone Cash.
    #[strum(serialize = "vodafone")]
    VodafoneCash,
    /// Bank transfer.
    #[strum(serialize = "bank")]
    BankTransfer,
}

impl PaymentMethod {
    /// Stable storage string, as accepted by `from_str`.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::VodafoneCash => "vodafone",
            PaymentMethod::BankTransfer => "bank",
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::PayPal => "PayPal",
            PaymentMethod::VodafoneCash => "Vodafone Cash",
            PaymentMethod::BankTransfer => "Bank Transfer",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
