//! Win detection logic for tic-tac-toe.

use super::super::{Board, Mark, Square};

/// The eight winning lines: rows, columns, diagonals.
pub const LINES: [[usize; 3]; 8] = [
    // Rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // Columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // Diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Checks if there is a winner on the board.
///
/// Returns `Some(mark)` for the first line holding three identical marks,
/// `None` otherwise. Under legal play at most one mark can own a line.
pub fn check_winner(board: &Board) -> Option<Mark> {
    let squares = board.squares();
    for [a, b, c] in LINES {
        if let Square::Occupied(mark) = squares[a] {
            if squares[b] == squares[a] && squares[c] == squares[a] {
                return Some(mark);
            }
        }
    }
    None
}
