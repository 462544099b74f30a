//! Squares named the way players type them.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tracing::instrument;

/// One of the nine squares, in row-major order.
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
    strum::EnumIter,
)]
pub enum Position {
    /// Square 1.
    #[strum(to_string = "Top-left")]
    TopLeft,
    /// Square 2.
    #[strum(to_string = "Top-center")]
    TopCenter,
    /// Square 3.
    #[strum(to_string = "Top-right")]
    TopRight,
    /// Square 4.
    #[strum(to_string = "Middle-left")]
    MiddleLeft,
    /// Square 5.
    #[strum(to_string = "Center")]
    Center,
    /// Square 6.
    #[strum(to_string = "Middle-right")]
    MiddleRight,
    /// Square 7.
    #[strum(to_string = "Bottom-left")]
    BottomLeft,
    /// Square 8.
    #[strum(to_string = "Bottom-center")]
    BottomCenter,
    /// Square 9.
    #[strum(to_string = "Bottom-right")]
    BottomRight,
}

impl Position {
    /// Reads player input: the 1-based number shown on the board, or a
    /// label such as `center` or `top left`. Case and punctuation are ignored.
    #[instrument]
    pub fn parse(input: &str) -> Option<Position> {
        let input = input.trim();
        if let Ok(number) = input.parse::<usize>() {
            return number.checked_sub(1).and_then(Self::from_index);
        }

        let wanted = squash(input);
        Self::iter().find(|square| squash(&square.to_string()) == wanted)
    }

    /// Board index (0-8).
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// The square at a board index, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
