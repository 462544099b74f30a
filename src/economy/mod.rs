//! Points economy: ledger collaborator, payments, match settlement.

mod ledger;
mod memory;
mod payment;
mod record;
mod settlement;

pub use ledger::{
    BalanceEffect, GameOutcome, Identity, Ledger, LedgerError, PaymentMethod, Posting, Standing,
    Transaction, TransactionId, TransactionKind, TransactionStatus,
};
pub use memory::MemoryLedger;
pub use payment::{PaymentError, PaymentProcessor, WithdrawalQuote, WithdrawalRequest};
pub use record::{MatchBook, MatchRecord, MatchStatus};
pub use settlement::{Settlement, stake, winner_of};
