//! Core domain types for tic-tac-toe.

use serde::{Deserialize, Serialize};

use super::action::MoveError;
use super::rules;

/// A mark placed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Mark {
    /// Mark X (moves first, seat A).
    X,
    /// Mark O (moves second, seat B).
    O,
}

impl Mark {
    /// Returns the opposing mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A square on the tic-tac-toe board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Square {
    /// Empty square.
    Empty,
    /// Square occupied by a mark.
    Occupied(Mark),
}

/// What the presentation layer shows for one square.
///
/// Occupied squares show their mark, empty squares show the 1-based
/// number a player types (or taps) to claim them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellView {
    /// Occupied by this mark.
    Taken(Mark),
    /// Empty, labelled with its 1-based number.
    Open(u8),
}

impl std::fmt::Display for CellView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellView::Taken(mark) => write!(f, "{}", mark),
            CellView::Open(n) => write!(f, "{}", n),
        }
    }
}

/// 3x3 tic-tac-toe board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    /// Squares in row-major order (0-8).
    squares: [Square; 9],
}

impl Board {
    /// Creates a new empty board.
    pub fn new() -> Self {
        Self {
            squares: [Square::Empty; 9],
        }
    }

    /// Gets the square at the given position (0-8).
    pub fn get(&self, pos: usize) -> Option<Square> {
        self.squares.get(pos).copied()
    }

    /// Checks if a square is empty. Out-of-range positions are never empty.
    pub fn is_empty(&self, pos: usize) -> bool {
        matches!(self.get(pos), Some(Square::Empty))
    }

    /// Returns all squares as a slice.
    pub fn squares(&self) -> &[Square; 9] {
        &self.squares
    }

    /// Places `mark` at `pos`.
    ///
    /// Turn order is not checked here; the match owns it.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError::InvalidMove`] if `pos` is outside 0-8 or the
    /// square is already occupied.
    pub fn apply_mark(&mut self, pos: usize, mark: Mark) -> Result<(), MoveError> {
        if !self.is_empty(pos) {
            return Err(MoveError::InvalidMove(pos));
        }
        self.squares[pos] = Square::Occupied(mark);
        Ok(())
    }

    /// Clears a square. Used by the search to undo a trial placement.
    pub(crate) fn clear(&mut self, pos: usize) {
        if let Some(square) = self.squares.get_mut(pos) {
            *square = Square::Empty;
        }
    }

    /// Positions of all empty squares in ascending order.
    pub fn empty_positions(&self) -> Vec<usize> {
        (0..9).filter(|&pos| self.is_empty(pos)).collect()
    }

    /// Returns the mark with three in a row, if any.
    pub fn winner(&self) -> Option<Mark> {
        rules::check_winner(self)
    }

    /// True when no square is empty.
    pub fn is_full(&self) -> bool {
        rules::is_full(self)
    }

    /// True when the board is won or full.
    pub fn is_terminal(&self) -> bool {
        self.winner().is_some() || self.is_full()
    }

    /// Renderable view of the nine squares.
    pub fn view(&self) -> [CellView; 9] {
        let mut cells = [CellView::Open(0); 9];
        for (pos, square) in self.squares.iter().enumerate() {
            cells[pos] = match square {
                Square::Empty => CellView::Open(pos as u8 + 1),
                Square::Occupied(mark) => CellView::Taken(*mark),
            };
        }
        cells
    }

    /// Formats the board as a human-readable string.
    pub fn display(&self) -> String {
        let cells = self.view();
        let mut result = String::new();
        for row in 0..3 {
            for col in 0..3 {
                result.push_str(&cells[row * 3 + col].to_string());
                if col < 2 {
                    result.push('|');
                }
            }
            if row < 2 {
                result.push_str("\n-+-+-\n");
            }
        }
        result
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}
