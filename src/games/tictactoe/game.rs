//! Match state machine: a board plus seats, wager and turn order.
//!
//! ```text
//! WaitingForSecondPlayer --join--> InProgress --win/draw--> Over
//!          |                          ^   |
//!          +--cancel--> Over(Void)    +---+ move
//! ```
//!
//! Seat A always plays [`Mark::X`] and moves first. In bot matches seat B
//! is the engine and has no participant id.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::action::{Move, MoveError};
use super::adversary::Adversary;
use super::types::{Board, CellView, Mark};

/// Identifier of a match, issued by the registry.
pub type MatchId = u64;

/// Identifier of a participant, owned by the identity collaborator.
pub type ParticipantId = i64;

/// A participant slot in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Seat {
    /// The creator; plays X.
    A,
    /// The joiner or the engine; plays O.
    B,
}

impl Seat {
    /// Mark played by this seat.
    pub fn mark(self) -> Mark {
        match self {
            Seat::A => Mark::X,
            Seat::B => Mark::O,
        }
    }

    /// Seat that plays `mark`.
    pub fn of(mark: Mark) -> Self {
        match mark {
            Mark::X => Seat::A,
            Mark::O => Seat::B,
        }
    }
}

/// Lifecycle phase of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum MatchPhase {
    /// Created by seat A, no second human yet.
    WaitingForSecondPlayer,
    /// Moves are being played.
    InProgress,
    /// Finished or cancelled; terminal.
    Over,
}

/// How a match ended.
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
pub enum Outcome {
    /// Seat A completed a line.
    WinnerA,
    /// Seat B completed a line.
    WinnerB,
    /// Full board, no line.
    Draw,
    /// Cancelled before a second player joined.
    Void,
}

impl Outcome {
    /// Winning seat, if any.
    pub fn winner(self) -> Option<Seat> {
        match self {
            Outcome::WinnerA => Some(Seat::A),
            Outcome::WinnerB => Some(Seat::B),
            Outcome::Draw | Outcome::Void => None,
        }
    }
}

/// Why a seat change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SeatError {
    /// Both seats are taken or the match already started.
    #[display("Match already has two players")]
    Full,
    /// The creator tried to join their own match.
    #[display("You cannot join your own match")]
    OwnMatch,
    /// Bot matches never take a second human.
    #[display("This match is against the bot")]
    BotMatch,
    /// Only a match still waiting for its second player can be cancelled.
    #[display("Only a match waiting for an opponent can be cancelled")]
    NotCancellable,
}

impl std::error::Error for SeatError {}

/// One match between two seats.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    id: MatchId,
    board: Board,
    seat_a: ParticipantId,
    seat_b: Option<ParticipantId>,
    wager: i64,
    vs_bot: bool,
    turn: Mark,
    phase: MatchPhase,
    outcome: Option<Outcome>,
    history: Vec<Move>,
}

impl Match {
    /// Creates a match with an empty board and X to move.
    ///
    /// Bot matches and matches created with both seats start
    /// [`InProgress`](MatchPhase::InProgress); otherwise the match waits for
    /// a second player. `seat_b` is ignored for bot matches.
    #[instrument]
    pub fn create(
        id: MatchId,
        seat_a: ParticipantId,
        wager: i64,
        vs_bot: bool,
        seat_b: Option<ParticipantId>,
    ) -> Self {
        let seat_b = if vs_bot { None } else { seat_b };
        let phase = if vs_bot || seat_b.is_some() {
            MatchPhase::InProgress
        } else {
            MatchPhase::WaitingForSecondPlayer
        };
        info!(match_id = id, ?phase, "Match created");

        Self {
            id,
            board: Board::new(),
            seat_a,
            seat_b,
            wager,
            vs_bot,
            turn: Mark::X,
            phase,
            outcome: None,
            history: Vec::new(),
        }
    }

    /// Seats a second human in a waiting match.
    ///
    /// # Errors
    ///
    /// [`SeatError::BotMatch`] for bot matches, [`SeatError::OwnMatch`] if
    /// `participant` created the match, [`SeatError::Full`] otherwise when
    /// the match is no longer waiting.
    #[instrument(skip(self), fields(match_id = self.id))]
    pub fn join(&mut self, participant: ParticipantId) -> Result<(), SeatError> {
        self.check_join(participant)?;
        self.seat_b = Some(participant);
        self.phase = MatchPhase::InProgress;
        info!(participant, "Second player joined");
        Ok(())
    }

    /// Whether [`join`](Self::join) would accept `participant`, without
    /// changing anything.
    pub fn check_join(&self, participant: ParticipantId) -> Result<(), SeatError> {
        if self.vs_bot {
            return Err(SeatError::BotMatch);
        }
        if participant == self.seat_a {
            return Err(SeatError::OwnMatch);
        }
        if self.phase != MatchPhase::WaitingForSecondPlayer {
            return Err(SeatError::Full);
        }
        Ok(())
    }

    /// Voids a match that is still waiting for its second player.
    ///
    /// # Errors
    ///
    /// [`SeatError::NotCancellable`] in any other phase.
    #[instrument(skip(self), fields(match_id = self.id))]
    pub fn cancel(&mut self) -> Result<(), SeatError> {
        if self.phase != MatchPhase::WaitingForSecondPlayer {
            return Err(SeatError::NotCancellable);
        }
        self.phase = MatchPhase::Over;
        self.outcome = Some(Outcome::Void);
        info!("Match cancelled");
        Ok(())
    }

    /// Places the acting seat's mark at `position`.
    ///
    /// Returns the outcome when this move ends the match.
    ///
    /// # Errors
    ///
    /// - [`MoveError::GameAlreadyOver`] once the match is over.
    /// - [`MoveError::AwaitingOpponent`] before the second player joined.
    /// - [`MoveError::NotYourTurn`] if `seat` does not hold the turn.
    /// - [`MoveError::InvalidMove`] for an out-of-range or occupied square.
    #[instrument(skip(self), fields(match_id = self.id, turn = %self.turn))]
    pub fn submit_move(
        &mut self,
        seat: Seat,
        position: usize,
    ) -> Result<Option<Outcome>, MoveError> {
        match self.phase {
            MatchPhase::Over => return Err(MoveError::GameAlreadyOver),
            MatchPhase::WaitingForSecondPlayer => return Err(MoveError::AwaitingOpponent),
            MatchPhase::InProgress => {}
        }
        if seat.mark() != self.turn {
            warn!(%seat, "Move out of turn");
            return Err(MoveError::NotYourTurn(self.turn));
        }

        self.board.apply_mark(position, self.turn)?;
        self.history.push(Move::new(self.turn, position));

        let outcome = match self.board.winner() {
            Some(mark) => Some(match Seat::of(mark) {
                Seat::A => Outcome::WinnerA,
                Seat::B => Outcome::WinnerB,
            }),
            None if self.board.is_full() => Some(Outcome::Draw),
            None => None,
        };

        match outcome {
            Some(outcome) => {
                self.phase = MatchPhase::Over;
                self.outcome = Some(outcome);
                info!(%outcome, moves = self.history.len(), "Match over");
            }
            None => {
                self.turn = self.turn.opponent();
                debug!(position, next = %self.turn, "Move applied");
            }
        }

        Ok(outcome)
    }

    /// Lets the engine play seat B's move.
    ///
    /// Returns the chosen position and the outcome if the move ended the
    /// match. The search runs on a copy of the board.
    ///
    /// # Errors
    ///
    /// [`MoveError::NotApplicable`] unless this is a bot match in progress
    /// with the engine to move.
    #[instrument(skip(self, adversary, rng), fields(match_id = self.id))]
    pub fn request_bot_move<R: Rng + ?Sized>(
        &mut self,
        adversary: &Adversary,
        rng: &mut R,
    ) -> Result<(usize, Option<Outcome>), MoveError> {
        if !self.vs_bot || self.phase != MatchPhase::InProgress || self.turn != Self::BOT_MARK {
            return Err(MoveError::NotApplicable);
        }

        let position = adversary
            .choose(&self.board, Self::BOT_MARK, rng)
            .ok_or(MoveError::NotApplicable)?;
        let outcome = self.submit_move(Seat::of(Self::BOT_MARK), position)?;
        info!(position, "Bot moved");
        Ok((position, outcome))
    }

    /// Mark played by the engine in bot matches.
    pub const BOT_MARK: Mark = Mark::O;

    /// Seat held by `participant`, if they play in this match.
    pub fn seat_of(&self, participant: ParticipantId) -> Option<Seat> {
        if participant == self.seat_a {
            Some(Seat::A)
        } else if self.seat_b == Some(participant) {
            Some(Seat::B)
        } else {
            None
        }
    }

    /// Participant in `seat`; `None` for an empty seat or the engine.
    pub fn participant(&self, seat: Seat) -> Option<ParticipantId> {
        match seat {
            Seat::A => Some(self.seat_a),
            Seat::B => self.seat_b,
        }
    }

    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// The board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Creator's participant id.
    pub fn seat_a(&self) -> ParticipantId {
        self.seat_a
    }

    /// Second human, if seated.
    pub fn seat_b(&self) -> Option<ParticipantId> {
        self.seat_b
    }

    /// Points at stake per human seat.
    pub fn wager(&self) -> i64 {
        self.wager
    }

    /// Whether seat B is the engine.
    pub fn vs_bot(&self) -> bool {
        self.vs_bot
    }

    /// Mark to move next.
    pub fn turn(&self) -> Mark {
        self.turn
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Whether the match reached its terminal phase.
    pub fn is_over(&self) -> bool {
        self.phase == MatchPhase::Over
    }

    /// Outcome, set exactly once when the match ends.
    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Moves played so far.
    pub fn history(&self) -> &[Move] {
        &self.history
    }

    /// Read-only snapshot for the presentation layer.
    pub fn view(&self) -> MatchView {
        MatchView {
            id: self.id,
            cells: self.board.view(),
            seat_a: self.seat_a,
            seat_b: self.seat_b,
            wager: self.wager,
            vs_bot: self.vs_bot,
            turn: self.turn,
            phase: self.phase,
            outcome: self.outcome,
        }
    }
}

/// Serializable snapshot of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    /// Match identifier.
    pub id: MatchId,
    /// Nine cells: a mark, or the 1-based number of an empty square.
    pub cells: [CellView; 9],
    /// Creator.
    pub seat_a: ParticipantId,
    /// Second human, if any.
    pub seat_b: Option<ParticipantId>,
    /// Points at stake per human seat.
    pub wager: i64,
    /// Whether seat B is the engine.
    pub vs_bot: bool,
    /// Mark to move.
    pub turn: Mark,
    /// Lifecycle phase.
    pub phase: MatchPhase,
    /// Outcome once over.
    pub outcome: Option<Outcome>,
}

impl MatchView {
    /// Board as a 3x3 text grid.
    pub fn grid(&self) -> String {
        self.cells
            .chunks(3)
            .map(|row| {
                row.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect::<Vec<_>>()
            .join("\n-+-+-\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn started(vs_bot: bool) -> Match {
        Match::create(1, 10, 50, vs_bot, if vs_bot { None } else { Some(20) })
    }

    #[test]
    fn test_create_waits_for_second_player() {
        let game = Match::create(1, 10, 50, false, None);
        assert_eq!(game.phase(), MatchPhase::WaitingForSecondPlayer);
        assert_eq!(game.turn(), Mark::X);
        assert_eq!(game.outcome(), None);
    }

    #[test]
    fn test_bot_match_ignores_seat_b() {
        let game = Match::create(1, 10, 50, true, Some(20));
        assert_eq!(game.phase(), MatchPhase::InProgress);
        assert_eq!(game.seat_b(), None);
    }

    #[test]
    fn test_move_before_join_is_refused() {
        let mut game = Match::create(1, 10, 50, false, None);
        assert_eq!(game.submit_move(Seat::A, 0), Err(MoveError::AwaitingOpponent));
    }

    #[test]
    fn test_turns_alternate() {
        let mut game = started(false);
        game.submit_move(Seat::A, 4).unwrap();
        assert_eq!(game.turn(), Mark::O);
        assert_eq!(game.submit_move(Seat::A, 0), Err(MoveError::NotYourTurn(Mark::O)));
        game.submit_move(Seat::B, 0).unwrap();
        assert_eq!(game.turn(), Mark::X);
    }

    #[test]
    fn test_occupied_square_keeps_turn() {
        let mut game = started(false);
        game.submit_move(Seat::A, 4).unwrap();
        assert_eq!(game.submit_move(Seat::B, 4), Err(MoveError::InvalidMove(4)));
        assert_eq!(game.turn(), Mark::O);
        assert_eq!(game.history().len(), 1);
    }

    #[test]
    fn test_win_ends_match() {
        let mut game = started(false);
        for (seat, pos) in [(Seat::A, 0), (Seat::B, 3), (Seat::A, 1), (Seat::B, 4)] {
            assert_eq!(game.submit_move(seat, pos).unwrap(), None);
        }
        assert_eq!(game.submit_move(Seat::A, 2).unwrap(), Some(Outcome::WinnerA));
        assert!(game.is_over());
        assert_eq!(game.submit_move(Seat::B, 5), Err(MoveError::GameAlreadyOver));
        assert_eq!(game.outcome(), Some(Outcome::WinnerA));
    }

    #[test]
    fn test_full_board_is_draw() {
        let mut game = started(false);
        // X O X / X O O / O X X
        let moves = [0, 1, 2, 4, 3, 5, 7, 6, 8];
        let mut last = None;
        for (i, pos) in moves.into_iter().enumerate() {
            let seat = if i % 2 == 0 { Seat::A } else { Seat::B };
            last = game.submit_move(seat, pos).unwrap();
        }
        assert_eq!(last, Some(Outcome::Draw));
    }

    #[test]
    fn test_join_rules() {
        let mut game = Match::create(1, 10, 50, false, None);
        assert_eq!(game.join(10), Err(SeatError::OwnMatch));
        game.join(20).unwrap();
        assert_eq!(game.phase(), MatchPhase::InProgress);
        assert_eq!(game.join(30), Err(SeatError::Full));
        assert_eq!(started(true).join(30), Err(SeatError::BotMatch));
    }

    #[test]
    fn test_cancel_only_while_waiting() {
        let mut game = Match::create(1, 10, 50, false, None);
        game.cancel().unwrap();
        assert_eq!(game.outcome(), Some(Outcome::Void));
        assert_eq!(game.submit_move(Seat::A, 0), Err(MoveError::GameAlreadyOver));
        assert_eq!(started(false).cancel(), Err(SeatError::NotCancellable));
    }

    #[test]
    fn test_bot_move_only_on_engine_turn() {
        let engine = Adversary::deterministic();
        let mut rng = StdRng::seed_from_u64(3);
        let mut game = started(true);
        assert_eq!(game.request_bot_move(&engine, &mut rng), Err(MoveError::NotApplicable));

        game.submit_move(Seat::A, 0).unwrap();
        let (pos, outcome) = game.request_bot_move(&engine, &mut rng).unwrap();
        assert_eq!(pos, 4);
        assert_eq!(outcome, None);
        assert_eq!(game.turn(), Mark::X);

        let mut human = started(false);
        human.submit_move(Seat::A, 0).unwrap();
        assert_eq!(human.request_bot_move(&engine, &mut rng), Err(MoveError::NotApplicable));
    }

    #[test]
    fn test_view_grid() {
        let mut game = started(false);
        game.submit_move(Seat::A, 4).unwrap();
        assert_eq!(game.view().grid(), "1|2|3\n-+-+-\n4|X|6\n-+-+-\n7|8|9");
    }
}
