//! Deposit and withdrawal pipeline.
//!
//! Withdrawals hold the full amount at request time. An admin then either
//! approves (the hold becomes final and a fee record is written) or rejects
//! (the held amount is credited back in full).

use std::sync::Arc;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::ledger::{
    BalanceEffect, Ledger, LedgerError, PaymentMethod, Posting, Transaction, TransactionId,
    TransactionKind, TransactionStatus,
};
use crate::games::tictactoe::ParticipantId;

/// Payment pipeline failure.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
pub enum PaymentError {
    /// Amount must be positive.
    #[display("Amount must be positive, got {}", _0)]
    #[from(ignore)]
    InvalidAmount(i64),

    /// Ledger refused or failed.
    #[display("{}", _0)]
    Ledger(LedgerError),
}

impl std::error::Error for PaymentError {}

/// Fee breakdown of a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    amount: i64,
    fee: i64,
    net: i64,
}

/// A withdrawal request waiting for an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    id: TransactionId,
    quote: WithdrawalQuote,
}

/// Deposit/withdrawal processing over a [`Ledger`].
#[derive(Debug)]
pub struct PaymentProcessor<L> {
    ledger: Arc<L>,
    fee_percent: i64,
}

impl<L> Clone for PaymentProcessor<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            fee_percent: self.fee_percent,
        }
    }
}

impl<L: Ledger> PaymentProcessor<L> {
    /// Creates a processor charging `fee_percent` on approved withdrawals.
    /// The percentage is clamped to `0..=100`.
    #[instrument(skip(ledger))]
    pub fn new(ledger: Arc<L>, fee_percent: i64) -> Self {
        info!("Creating PaymentProcessor");
        Self {
            ledger,
            fee_percent: fee_percent.clamp(0, 100),
        }
    }

    /// Fee and net payout for withdrawing `amount`; the fee rounds down.
    pub fn quote(&self, amount: i64) -> WithdrawalQuote {
        // Widened so any i64 amount can be multiplied. With the percentage
        // in 0..=100 the fee never exceeds the amount, so it fits back.
        let fee = (i128::from(amount) * i128::from(self.fee_percent) / 100) as i64;
        WithdrawalQuote {
            amount,
            fee,
            net: amount - fee,
        }
    }

    /// Credits `amount` and records a completed deposit in one batch.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidAmount`] for non-positive amounts, ledger
    /// errors otherwise.
    #[instrument(skip(self))]
    pub fn deposit(
        &self,
        participant: ParticipantId,
        amount: i64,
        method: PaymentMethod,
    ) -> Result<TransactionId, PaymentError> {
        if amount <= 0 {
            warn!("Rejected non-positive deposit");
            return Err(PaymentError::InvalidAmount(amount));
        }

        let id = self.ledger.record_transaction(
            Posting::new(participant, amount, TransactionKind::Deposit)
                .with_method(method.code())
                .with_detail(format!("Deposit of {} points via {}", amount, method)),
        )?;

        info!(transaction_id = id, "Deposit completed");
        Ok(id)
    }

    /// Records a pending withdrawal and holds the full amount.
    ///
    /// The balance check and the hold happen in one ledger batch.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidAmount`] for non-positive amounts,
    /// [`LedgerError::InsufficientBalance`] if `amount` exceeds the balance.
    #[instrument(skip(self))]
    pub fn withdraw(
        &self,
        participant: ParticipantId,
        amount: i64,
        method: PaymentMethod,
    ) -> Result<WithdrawalRequest, PaymentError> {
        if amount <= 0 {
            warn!("Rejected non-positive withdrawal");
            return Err(PaymentError::InvalidAmount(amount));
        }

        let quote = self.quote(amount);
        let id = self.ledger.record_transaction(
            Posting::new(participant, -amount, TransactionKind::Withdrawal)
                .with_status(TransactionStatus::Pending)
                .with_effect(BalanceEffect::RequireFunds)
                .with_method(method.code())
                .with_detail(format!(
                    "Withdrawal request for {} points ({} after {} fee) via {}",
                    amount, quote.net, quote.fee, method
                )),
        )?;

        info!(transaction_id = id, fee = quote.fee, net = quote.net, "Withdrawal held");
        Ok(WithdrawalRequest { id, quote })
    }

    /// Completes a pending withdrawal and records its fee.
    ///
    /// The balance is not touched; the amount was held at request time.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidTransactionState`] unless `id` is a pending
    /// withdrawal.
    #[instrument(skip(self))]
    pub fn approve_withdrawal(&self, id: TransactionId) -> Result<Transaction, PaymentError> {
        let request = self.pending_withdrawal(id)?;
        let quote = self.quote(-*request.amount());

        let mut fee = Posting::new(*request.participant(), -quote.fee, TransactionKind::Fee)
            .with_effect(BalanceEffect::RecordOnly)
            .with_detail(format!("Transaction fee for withdrawal #{}", id));
        if let Some(method) = request.method() {
            fee = fee.with_method(method.clone());
        }

        let approved = self.ledger.resolve(
            id,
            Some(TransactionKind::Withdrawal),
            TransactionStatus::Completed,
            &[fee],
        )?;

        info!(transaction_id = id, fee = quote.fee, "Withdrawal approved");
        Ok(approved)
    }

    /// Rejects a pending withdrawal and credits the held amount back.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidTransactionState`] unless `id` is a pending
    /// withdrawal.
    #[instrument(skip(self))]
    pub fn reject_withdrawal(&self, id: TransactionId) -> Result<Transaction, PaymentError> {
        let request = self.pending_withdrawal(id)?;
        let held = -*request.amount();

        let refund = Posting::new(*request.participant(), held, TransactionKind::Adjustment)
            .with_detail(format!("Refund of rejected withdrawal #{}", id));

        let rejected = self.ledger.resolve(
            id,
            Some(TransactionKind::Withdrawal),
            TransactionStatus::Rejected,
            &[refund],
        )?;

        info!(transaction_id = id, refunded = held, "Withdrawal rejected");
        Ok(rejected)
    }

    /// Pending withdrawal requests, oldest first.
    #[instrument(skip(self))]
    pub fn pending_withdrawals(&self) -> Result<Vec<Transaction>, PaymentError> {
        Ok(self.ledger.pending(TransactionKind::Withdrawal)?)
    }

    /// Loads `id`, failing unless it is a pending withdrawal. The ledger
    /// repeats the check atomically when resolving.
    fn pending_withdrawal(&self, id: TransactionId) -> Result<Transaction, PaymentError> {
        let record = self
            .ledger
            .transaction(id)?
            .ok_or(LedgerError::TransactionNotFound(id))?;

        if *record.kind() != TransactionKind::Withdrawal
            || *record.status() != TransactionStatus::Pending
        {
            warn!(transaction_id = id, status = %record.status(), "Not a pending withdrawal");
            return Err(LedgerError::InvalidTransactionState {
                id,
                kind: *record.kind(),
                status: *record.status(),
            }
            .into());
        }
        Ok(record)
    }
}
