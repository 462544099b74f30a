//! Tests for chat command handling.

use std::sync::Arc;

use strictly_xo::{
    Dispatcher, EconomyConfig, ErrorKind, Ledger, MemoryLedger, MatchPhase, Outcome,
};

fn setup() -> (Arc<MemoryLedger>, Dispatcher<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new(100));
    ledger.set_admin(99, true);
    let config = EconomyConfig::from_toml("bot_randomness = 0.0").unwrap();
    let dispatcher = Dispatcher::new(Arc::clone(&ledger), &config);
    (ledger, dispatcher)
}

#[test]
fn test_first_contact_registers_participant() {
    let (ledger, dispatcher) = setup();
    let reply = dispatcher.handle_text(1, "Alice", "/balance");
    assert_eq!(reply.text(), "Balance: 100 points");
    assert!(reply.error().is_none());
    assert_eq!(ledger.balance(1).unwrap(), 100);
}

#[test]
fn test_parse_errors_become_replies() {
    let (_ledger, dispatcher) = setup();
    let reply = dispatcher.handle_text(1, "Alice", "/move 1");
    assert!(reply.text().starts_with("Usage: /move"));
    let reply = dispatcher.handle_text(1, "Alice", "/fly");
    assert!(reply.text().contains("Unknown command"));
}

#[test]
fn test_human_match_through_commands() {
    let (ledger, dispatcher) = setup();
    let created = dispatcher.handle_text(1, "Alice", "/play 20");
    let id = created.view().as_ref().unwrap().id;
    assert_eq!(ledger.balance(1).unwrap(), 80);

    let joined = dispatcher.handle_text(2, "Bob", &format!("/join {id}"));
    assert_eq!(joined.view().as_ref().unwrap().phase, MatchPhase::InProgress);

    let moves = [(1, "Alice", 1), (2, "Bob", 4), (1, "Alice", 2), (2, "Bob", 5)];
    for (actor, name, square) in moves {
        let reply = dispatcher.handle_text(actor, name, &format!("/move {id} {square}"));
        assert!(reply.error().is_none(), "{}", reply.text());
    }
    let last = dispatcher.handle_text(1, "Alice", &format!("/move {id} top right"));
    assert_eq!(last.view().as_ref().unwrap().outcome, Some(Outcome::WinnerA));
    assert!(last.text().contains("You win!"), "{}", last.text());
    assert!(last.text().contains("Points change: +20"), "{}", last.text());

    assert_eq!(ledger.balance(1).unwrap(), 120);
    assert_eq!(ledger.balance(2).unwrap(), 80);

    let gone = dispatcher.handle_text(1, "Alice", &format!("/board {id}"));
    assert_eq!(*gone.error(), Some(ErrorKind::Rejected));
}

#[test]
fn test_out_of_turn_reports_error_kind() {
    let (_ledger, dispatcher) = setup();
    let id = dispatcher
        .handle_text(1, "Alice", "/play 10")
        .view()
        .as_ref()
        .unwrap()
        .id;
    dispatcher.handle_text(2, "Bob", &format!("/join {id}"));

    let reply = dispatcher.handle_text(2, "Bob", &format!("/move {id} 5"));
    assert_eq!(*reply.error(), Some(ErrorKind::NotYourTurn));
    assert!(reply.text().starts_with("Error:"));
}

#[test]
fn test_bot_replies_and_settles() {
    let (ledger, dispatcher) = setup();
    let id = dispatcher
        .handle_text(1, "Alice", "/play_bot 10")
        .view()
        .as_ref()
        .unwrap()
        .id;

    let first = dispatcher.handle_text(1, "Alice", &format!("/move {id} 1"));
    assert!(first.text().contains("The bot played Center"), "{}", first.text());

    let mut reply = first;
    for square in 2..=9 {
        if reply.view().as_ref().is_some_and(|v| v.outcome.is_some()) {
            break;
        }
        let next = dispatcher.handle_text(1, "Alice", &format!("/move {id} {square}"));
        if next.error().is_none() {
            reply = next;
        }
    }

    let view = reply.view().clone().unwrap();
    assert!(view.outcome.is_some());
    assert_ne!(view.outcome, Some(Outcome::WinnerA));
    assert!(dispatcher.arena().registry().is_empty());
    let expected = if view.outcome == Some(Outcome::Draw) { 100 } else { 90 };
    assert_eq!(ledger.balance(1).unwrap(), expected);
}

#[test]
fn test_cancel_and_games_listing() {
    let (ledger, dispatcher) = setup();
    let id = dispatcher
        .handle_text(1, "Alice", "/play 25")
        .view()
        .as_ref()
        .unwrap()
        .id;
    let listing = dispatcher.handle_text(2, "Bob", "/games");
    assert!(listing.text().contains(&format!("/join {id}")), "{}", listing.text());

    let reply = dispatcher.handle_text(1, "Alice", &format!("/cancel {id}"));
    assert!(reply.text().contains("25 points returned"), "{}", reply.text());
    assert_eq!(ledger.balance(1).unwrap(), 100);
    assert!(dispatcher.handle_text(2, "Bob", "/games").text().contains("No matches"));
}

#[test]
fn test_withdrawal_needs_admin_decision() {
    let (ledger, dispatcher) = setup();
    let reply = dispatcher.handle_text(1, "Alice", "/withdraw 40 paypal");
    assert!(reply.text().contains("you receive 38 after a 2 point fee"), "{}", reply.text());
    assert_eq!(ledger.balance(1).unwrap(), 60);

    let denied = dispatcher.handle_text(1, "Alice", "/pending");
    assert_eq!(*denied.error(), Some(ErrorKind::Rejected));

    let pending = dispatcher.handle_text(99, "Admin", "/pending");
    assert!(pending.text().starts_with('#'), "{}", pending.text());

    let id = ledger.pending(strictly_xo::TransactionKind::Withdrawal).unwrap()[0]
        .id()
        .to_owned();
    let rejected = dispatcher.handle_text(99, "Admin", &format!("/reject {id}"));
    assert!(rejected.text().contains("40 points returned"), "{}", rejected.text());
    assert_eq!(ledger.balance(1).unwrap(), 100);

    let again = dispatcher.handle_text(99, "Admin", &format!("/approve {id}"));
    assert_eq!(*again.error(), Some(ErrorKind::InvalidTransactionState));
}

#[test]
fn test_deposit_stats_and_leaderboard() {
    let (_ledger, dispatcher) = setup();
    let reply = dispatcher.handle_text(1, "Alice", "/deposit 50 bank");
    assert!(reply.text().starts_with("Deposited 50 points via Bank Transfer"));
    dispatcher.handle_text(2, "Bob", "/balance");

    let stats = dispatcher.handle_text(1, "Alice", "/stats");
    assert_eq!(stats.text(), "Alice: 150 points, 0 wins, 0 losses, 0 draws");

    let board = dispatcher.handle_text(2, "Bob", "/leaderboard");
    assert!(board.text().starts_with("1. Alice: 150 points"), "{}", board.text());

    let bad = dispatcher.handle_text(1, "Alice", "/deposit 0 bank");
    assert_eq!(*bad.error(), Some(ErrorKind::InvalidAmount));
}

#[test]
fn test_extreme_amounts_leave_balance_intact() {
    let (ledger, dispatcher) = setup();
    dispatcher.handle_text(1, "Alice", "/balance");

    let deposit = dispatcher.handle_text(1, "Alice", "/deposit 9223372036854775807 paypal");
    assert_eq!(*deposit.error(), Some(ErrorKind::InvalidAmount), "{}", deposit.text());
    assert_eq!(ledger.balance(1).unwrap(), 100);

    let withdraw = dispatcher.handle_text(1, "Alice", "/withdraw 9223372036854775807 paypal");
    assert_eq!(*withdraw.error(), Some(ErrorKind::InsufficientBalance), "{}", withdraw.text());
    assert_eq!(ledger.balance(1).unwrap(), 100);
    assert!(ledger.transactions().is_empty());
}
