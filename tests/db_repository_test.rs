//! Tests for the SQLite ledger repository.

use diesel::Connection;
use diesel::SqliteConnection;
use diesel_migrations::MigrationHarness;
use tempfile::NamedTempFile;

use strictly_xo::{
    ArenaService, EconomyConfig, Identity, Ledger, LedgerError, LedgerRepository, MIGRATIONS,
    MatchBook, MatchStatus, PaymentError, PaymentMethod, PaymentProcessor, Posting,
    TransactionKind, TransactionStatus,
};
use std::sync::Arc;

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready repository.
fn setup_test_db() -> (NamedTempFile, LedgerRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let mut conn = SqliteConnection::establish(&db_path).expect("Failed to connect");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Migrations failed");

    let repo = LedgerRepository::new(db_path, 100).expect("Failed to create repository");
    (db_file, repo)
}

#[test]
fn test_empty_path_rejected() {
    assert!(LedgerRepository::new("  ".to_string(), 100).is_err());
}

#[test]
fn test_open_runs_migrations() {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = LedgerRepository::open(db_path, 250).expect("Open failed");
    let standing = repo.ensure_participant(1, "Alice").expect("Ensure failed");
    assert_eq!(*standing.points(), 250);
}

#[test]
fn test_ensure_participant_creates_once() {
    let (_db, repo) = setup_test_db();
    let first = repo.ensure_participant(7, "Alice").expect("Ensure failed");
    assert_eq!(*first.points(), 100);

    repo.adjust_balance(7, 25).expect("Adjust failed");
    let again = repo.ensure_participant(7, "Alice B").expect("Ensure failed");
    assert_eq!(*again.points(), 125);
    assert_eq!(again.display_name(), "Alice B");
}

#[test]
fn test_unknown_participant() {
    let (_db, repo) = setup_test_db();
    assert!(matches!(
        repo.balance(99),
        Err(LedgerError::UnknownParticipant(99))
    ));
    assert!(repo.standing(99).expect("Query failed").is_none());
    assert!(!repo.is_admin(99).expect("Query failed"));
}

#[test]
fn test_failed_batch_is_rolled_back() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    repo.ensure_participant(2, "Bob").expect("Ensure failed");

    let result = repo.post(&[
        Posting::new(1, 40, TransactionKind::Adjustment),
        Posting::new(2, -500, TransactionKind::Bet)
            .with_effect(strictly_xo::BalanceEffect::RequireFunds),
    ]);
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientBalance { participant: 2, balance: 100, requested: 500 })
    ));
    assert_eq!(repo.balance(1).expect("Balance failed"), 100);
    assert!(repo.history(1).expect("History failed").is_empty());
}

#[test]
fn test_transfer_is_atomic_and_conserves_points() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    repo.ensure_participant(2, "Bob").expect("Ensure failed");

    repo.transfer(1, 2, 30).expect("Transfer failed");
    assert_eq!(repo.balance(1).expect("Balance failed"), 70);
    assert_eq!(repo.balance(2).expect("Balance failed"), 130);

    assert!(repo.transfer(1, 2, 71).is_err());
    assert_eq!(repo.balance(1).expect("Balance failed"), 70);
    assert_eq!(repo.balance(2).expect("Balance failed"), 130);
}

#[test]
fn test_records_round_trip_through_storage() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");

    let id = repo
        .record_transaction(
            Posting::new(1, -20, TransactionKind::Withdrawal)
                .with_status(TransactionStatus::Pending)
                .with_method("paypal")
                .with_detail("cash out")
                .with_match_id(42),
        )
        .expect("Record failed");

    let record = repo
        .transaction(id)
        .expect("Query failed")
        .expect("Record missing");
    assert_eq!(*record.kind(), TransactionKind::Withdrawal);
    assert_eq!(*record.status(), TransactionStatus::Pending);
    assert_eq!(*record.amount(), -20);
    assert_eq!(record.method().as_deref(), Some("paypal"));
    assert_eq!(*record.match_id(), Some(42));
    assert!(record.processed_at().is_none());

    let done = repo
        .set_transaction_status(id, TransactionStatus::Completed)
        .expect("Resolve failed");
    assert!(done.processed_at().is_some());
    assert!(matches!(
        repo.set_transaction_status(id, TransactionStatus::Rejected),
        Err(LedgerError::InvalidTransactionState { .. })
    ));
}

#[test]
fn test_withdrawal_pipeline_on_sqlite() {
    let (_db, repo) = setup_test_db();
    let repo = Arc::new(repo);
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    let payments = PaymentProcessor::new(Arc::clone(&repo), 5);

    let request = payments
        .withdraw(1, 40, PaymentMethod::VodafoneCash)
        .expect("Withdraw failed");
    assert_eq!(repo.balance(1).expect("Balance failed"), 60);
    assert_eq!(payments.pending_withdrawals().expect("List failed").len(), 1);

    payments
        .reject_withdrawal(*request.id())
        .expect("Reject failed");
    assert_eq!(repo.balance(1).expect("Balance failed"), 100);
    assert!(payments.pending_withdrawals().expect("List failed").is_empty());
    assert!(payments.approve_withdrawal(*request.id()).is_err());
    assert_eq!(repo.balance(1).expect("Balance failed"), 100);
}

#[test]
fn test_settlement_updates_statistics() {
    let (_db, repo) = setup_test_db();
    let repo = Arc::new(repo);
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    repo.ensure_participant(2, "Bob").expect("Ensure failed");
    let arena = ArenaService::new(Arc::clone(&repo), &EconomyConfig::default());

    let id = arena.create_match(1, 50, false).expect("Create failed").id;
    arena.join_match(id, 2).expect("Join failed");
    for (actor, pos) in [(1, 0), (2, 3), (1, 1), (2, 4), (1, 2)] {
        arena.submit_move(id, actor, pos).expect("Move failed");
    }
    arena.settle(id).expect("Settle failed");

    let alice = repo.standing(1).expect("Query failed").expect("Missing");
    let bob = repo.standing(2).expect("Query failed").expect("Missing");
    assert_eq!((*alice.points(), *alice.wins(), *alice.losses()), (150, 1, 0));
    assert_eq!((*bob.points(), *bob.wins(), *bob.losses()), (50, 0, 1));
}

#[test]
fn test_leaderboard_orders_and_skips_banned() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    repo.ensure_participant(2, "Bob").expect("Ensure failed");
    repo.ensure_participant(3, "Carol").expect("Ensure failed");
    repo.adjust_balance(2, 50).expect("Adjust failed");
    repo.adjust_balance(3, 10).expect("Adjust failed");
    repo.set_banned(3, true).expect("Ban failed");

    let board = repo.leaderboard(10).expect("Leaderboard failed");
    let names: Vec<&str> = board.iter().map(|s| s.display_name().as_str()).collect();
    assert_eq!(names, vec!["Bob", "Alice"]);
    assert_eq!(repo.leaderboard(1).expect("Leaderboard failed").len(), 1);
}

#[test]
fn test_admin_flag() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    assert!(!repo.is_admin(1).expect("Query failed"));
    repo.set_admin(1, true).expect("Set admin failed");
    assert!(repo.is_admin(1).expect("Query failed"));
    assert!(matches!(
        repo.set_admin(5, true),
        Err(LedgerError::UnknownParticipant(5))
    ));
}

#[test]
fn test_overflowing_credit_rejects_batch() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");

    let result = repo.post(&[
        Posting::new(1, 5, TransactionKind::Adjustment),
        Posting::new(1, i64::MAX, TransactionKind::Deposit),
    ]);
    assert!(
        matches!(result, Err(LedgerError::BalanceOverflow { participant: 1, balance: 105, .. })),
        "{result:?}"
    );
    assert_eq!(repo.balance(1).expect("Balance failed"), 100);
    assert!(repo.history(1).expect("History failed").is_empty());
}

#[test]
fn test_concurrent_withdrawals_cannot_overdraw() {
    let (_db, repo) = setup_test_db();
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    let payments = PaymentProcessor::new(Arc::new(repo.clone()), 5);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let payments = &payments;
                scope.spawn(move || payments.withdraw(1, 60, PaymentMethod::PayPal))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("Thread panicked"))
            .collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(err, PaymentError::Ledger(LedgerError::InsufficientBalance { .. })),
            "{err}"
        );
    }
    assert_eq!(repo.balance(1).expect("Balance failed"), 40);
    assert_eq!(repo.pending(TransactionKind::Withdrawal).expect("List failed").len(), 1);
}

#[test]
fn test_unfinished_match_refunded_after_restart() {
    let (db, repo) = setup_test_db();
    let db_path = db.path().to_str().expect("Invalid path").to_string();
    let repo = Arc::new(repo);
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    repo.ensure_participant(2, "Bob").expect("Ensure failed");

    let id = {
        let arena = ArenaService::new(Arc::clone(&repo), &EconomyConfig::default());
        let id = arena.create_match(1, 50, false).expect("Create failed").id;
        arena.join_match(id, 2).expect("Join failed");
        arena.submit_move(id, 1, 4).expect("Move failed");
        id
    };
    assert_eq!(repo.balance(1).expect("Balance failed"), 50);
    assert_eq!(repo.balance(2).expect("Balance failed"), 50);

    // A fresh repository and service on the same file.
    let reopened = Arc::new(LedgerRepository::open(db_path, 100).expect("Open failed"));
    let unfinished = reopened.unfinished_matches().expect("Query failed");
    assert_eq!(unfinished.len(), 1);
    assert_eq!(*unfinished[0].id(), id);
    assert_eq!(*unfinished[0].status(), MatchStatus::Active);
    assert_eq!(*unfinished[0].seat_b(), Some(2));
    assert_eq!(*unfinished[0].wager(), 50);

    let arena = ArenaService::new(Arc::clone(&reopened), &EconomyConfig::default());
    assert_eq!(arena.recover().expect("Recover failed"), vec![id]);
    assert_eq!(reopened.balance(1).expect("Balance failed"), 100);
    assert_eq!(reopened.balance(2).expect("Balance failed"), 100);

    let record = reopened.match_record(id).expect("Query failed").expect("Missing");
    assert_eq!(*record.status(), MatchStatus::Abandoned);
    assert!(record.completed_at().is_some());
    assert!(arena.recover().expect("Recover failed").is_empty());

    let next = arena.create_match(1, 10, false).expect("Create failed").id;
    assert!(next > id);
}

#[test]
fn test_closed_match_refuses_second_settlement() {
    let (_db, repo) = setup_test_db();
    let repo = Arc::new(repo);
    repo.ensure_participant(1, "Alice").expect("Ensure failed");
    let arena = ArenaService::new(Arc::clone(&repo), &EconomyConfig::default());

    let id = arena.create_match(1, 30, false).expect("Create failed").id;
    arena.cancel_match(id, 1).expect("Cancel failed");
    let record = repo.match_record(id).expect("Query failed").expect("Missing");
    assert_eq!(*record.status(), MatchStatus::Cancelled);

    let again = repo.close_match(id, MatchStatus::Abandoned, None, &record.refunds());
    assert!(matches!(again, Err(LedgerError::MatchClosed { .. })), "{again:?}");
    assert_eq!(repo.balance(1).expect("Balance failed"), 100);
    assert!(matches!(
        repo.close_match(999, MatchStatus::Abandoned, None, &[]),
        Err(LedgerError::UnknownMatch(999))
    ));
}
