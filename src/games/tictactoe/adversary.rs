//! Minimax opponent for bot matches.
//!
//! The engine searches the full game tree below the current position. A
//! line won by the engine at ply `d` scores `10 - d`, a line lost scores
//! `d - 10`, a draw scores `0`, so faster wins and slower losses are
//! preferred. Among equal scores the lowest board index wins.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument};

use super::{Board, Mark};

/// Probability of a random opening move used by default.
pub const DEFAULT_OPENING_RANDOMNESS: f64 = 0.3;

/// Empty-square count at or above which the opening randomization applies.
const OPENING_EMPTY_SQUARES: usize = 8;

/// Decision-making opponent for bot matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adversary {
    opening_randomness: f64,
}

impl Adversary {
    /// Creates an engine that plays a random opening with the given
    /// probability. Values outside `[0, 1]` are clamped.
    pub fn new(opening_randomness: f64) -> Self {
        let opening_randomness = if opening_randomness.is_nan() {
            0.0
        } else {
            opening_randomness.clamp(0.0, 1.0)
        };
        Self { opening_randomness }
    }

    /// Creates an engine that always searches.
    pub fn deterministic() -> Self {
        Self::new(0.0)
    }

    /// Probability of a random opening move.
    pub fn opening_randomness(&self) -> f64 {
        self.opening_randomness
    }

    /// Chooses a move for `mark`, returning `None` on a finished board.
    ///
    /// With 8 or 9 empty squares the engine picks a uniformly random empty
    /// square with probability [`opening_randomness`](Self::opening_randomness);
    /// every other decision is [`best_move`](Self::best_move).
    #[instrument(skip(self, board, rng), fields(mark = %mark))]
    pub fn choose<R: Rng + ?Sized>(&self, board: &Board, mark: Mark, rng: &mut R) -> Option<usize> {
        if board.is_terminal() {
            return None;
        }

        let empty = board.empty_positions();
        if empty.len() >= OPENING_EMPTY_SQUARES
            && self.opening_randomness > 0.0
            && rng.gen_bool(self.opening_randomness)
        {
            let pick = empty.choose(rng).copied();
            debug!(position = ?pick, "Random opening move");
            return pick;
        }

        Self::best_move(board, mark)
    }

    /// Deterministic minimax choice for `mark`.
    ///
    /// Returns `None` if the board is already won or full.
    pub fn best_move(board: &Board, mark: Mark) -> Option<usize> {
        if board.is_terminal() {
            return None;
        }

        let mut scratch = board.clone();
        let mut best: Option<(usize, i32)> = None;

        for pos in board.empty_positions() {
            if scratch.apply_mark(pos, mark).is_err() {
                continue;
            }
            let score = minimax(&mut scratch, mark, 0, false);
            scratch.clear(pos);

            if best.is_none_or(|(_, top)| score > top) {
                best = Some((pos, score));
            }
        }

        debug!(best = ?best, "Search finished");
        best.map(|(pos, _)| pos)
    }
}

impl Default for Adversary {
    fn default() -> Self {
        Self::new(DEFAULT_OPENING_RANDOMNESS)
    }
}

/// Scores `board` from `me`'s point of view. Recursion depth is bounded
/// by the number of empty squares (at most 9).
fn minimax(board: &mut Board, me: Mark, depth: i32, maximizing: bool) -> i32 {
    match board.winner() {
        Some(winner) if winner == me => return 10 - depth,
        Some(_) => return depth - 10,
        None => {}
    }
    if board.is_full() {
        return 0;
    }

    let to_move = if maximizing { me } else { me.opponent() };
    let mut best = if maximizing { i32::MIN } else { i32::MAX };

    for pos in 0..9 {
        if board.apply_mark(pos, to_move).is_err() {
            continue;
        }
        let score = minimax(board, me, depth + 1, !maximizing);
        board.clear(pos);

        best = if maximizing {
            best.max(score)
        } else {
            best.min(score)
        };
    }

    best
}
