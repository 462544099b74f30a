//! Property tests for the match state machine.

use proptest::prelude::*;
use strictly_xo::{Board, Mark, Match, MatchPhase, MoveError, Outcome, Seat, Square};

#[rustfmt::skip]
const LINES: [[usize; 3]; 8] = [
    [0, 1, 2], [3, 4, 5], [6, 7, 8],
    [0, 3, 6], [1, 4, 7], [2, 5, 8],
    [0, 4, 8], [2, 4, 6],
];

fn has_line(board: &Board, mark: Mark) -> bool {
    LINES
        .iter()
        .any(|line| line.iter().all(|&p| board.get(p) == Some(Square::Occupied(mark))))
}

fn human_match() -> Match {
    Match::create(1, 10, 20, false, Some(20))
}

proptest! {
    /// Any sequence of attempted moves (legal or not) keeps turns strictly
    /// alternating and never overwrites a square.
    #[test]
    fn prop_turns_alternate_and_squares_stay_put(
        attempts in prop::collection::vec((any::<bool>(), 0usize..11), 0..40)
    ) {
        let mut game = human_match();

        for (seat_a, pos) in attempts {
            let seat = if seat_a { Seat::A } else { Seat::B };
            let before = game.board().clone();
            let turn = game.turn();

            match game.submit_move(seat, pos) {
                Ok(outcome) => {
                    prop_assert_eq!(seat.mark(), turn);
                    prop_assert_eq!(before.get(pos), Some(Square::Empty));
                    prop_assert_eq!(game.board().get(pos), Some(Square::Occupied(turn)));
                    for other in (0..9).filter(|&p| p != pos) {
                        prop_assert_eq!(game.board().get(other), before.get(other));
                    }
                    if outcome.is_none() {
                        prop_assert_eq!(game.turn(), turn.opponent());
                    }
                }
                Err(_) => {
                    prop_assert_eq!(game.board(), &before);
                    prop_assert_eq!(game.turn(), turn);
                }
            }
        }
    }

    /// A reachable board never shows two winners, and the outcome is set
    /// exactly when the match is over.
    #[test]
    fn prop_single_winner_and_outcome_once(
        order in Just((0usize..9).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let mut game = human_match();
        let mut outcomes = 0;

        for pos in order {
            let seat = Seat::of(game.turn());
            match game.submit_move(seat, pos) {
                Ok(Some(_)) => outcomes += 1,
                Ok(None) => prop_assert!(game.outcome().is_none()),
                Err(e) => {
                    prop_assert!(game.is_over());
                    prop_assert_eq!(e, MoveError::GameAlreadyOver);
                }
            }

            let board = game.board();
            prop_assert!(!(has_line(board, Mark::X) && has_line(board, Mark::O)));
        }

        prop_assert_eq!(outcomes, 1);
        prop_assert_eq!(game.phase(), MatchPhase::Over);
        let expected = match game.board().winner() {
            Some(Mark::X) => Outcome::WinnerA,
            Some(Mark::O) => Outcome::WinnerB,
            None => Outcome::Draw,
        };
        prop_assert_eq!(game.outcome(), Some(expected));
    }
}
