//! Chat command decoding and reply rendering.
//!
//! Text is decoded once into a [`Command`]; everything after that is a
//! typed call into [`ArenaService`] or [`PaymentProcessor`]. Every failure
//! becomes reply text, the serving loop never sees an error.

use std::str::FromStr;
use std::sync::Arc;

use derive_getters::Getters;
use derive_more::Display;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EconomyConfig;
use crate::economy::{
    Identity, LedgerError, MatchBook, PaymentMethod, PaymentProcessor, Settlement, TransactionId,
};
use crate::error::{ArenaError, ErrorKind};
use crate::games::tictactoe::{MatchId, MatchView, Outcome, ParticipantId, Position, Seat};
use crate::service::ArenaService;

/// Entries shown by `/leaderboard`.
const LEADERBOARD_SIZE: usize = 10;

/// A decoded chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a match against another human.
    Play {
        /// Points at stake per seat.
        wager: i64,
    },
    /// Open a match against the engine.
    PlayBot {
        /// Points at stake.
        wager: i64,
    },
    /// Take the second seat of a waiting match.
    Join {
        /// Match to join.
        match_id: MatchId,
    },
    /// Cancel one's own waiting match.
    Cancel {
        /// Match to cancel.
        match_id: MatchId,
    },
    /// Place a mark.
    Move {
        /// Match to play in.
        match_id: MatchId,
        /// Target square.
        position: Position,
    },
    /// Show a board.
    Board {
        /// Match to show.
        match_id: MatchId,
    },
    /// List matches waiting for an opponent.
    Games,
    /// Show the caller's balance.
    Balance,
    /// Show the caller's record.
    Stats,
    /// Show the top participants.
    Leaderboard,
    /// Buy points.
    Deposit {
        /// Points to credit.
        amount: i64,
        /// How the payment is made.
        method: PaymentMethod,
    },
    /// Request a cash-out.
    Withdraw {
        /// Points to withdraw.
        amount: i64,
        /// How the payout is made.
        method: PaymentMethod,
    },
    /// Admin: list pending withdrawals.
    Pending,
    /// Admin: approve a withdrawal.
    Approve {
        /// Withdrawal record.
        transaction_id: TransactionId,
    },
    /// Admin: reject a withdrawal.
    Reject {
        /// Withdrawal record.
        transaction_id: TransactionId,
    },
    /// Admin: retry the settlement of a finished match.
    Settle {
        /// Match to settle.
        match_id: MatchId,
    },
    /// Show usage.
    Help,
}

/// Why a line of text is not a command.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CommandError {
    /// Nothing but whitespace.
    #[display("Empty command")]
    Empty,
    /// Unrecognized command word.
    #[display("Unknown command '{}'. Try /help", _0)]
    Unknown(String),
    /// Known command with bad arguments.
    #[display("Usage: {}", _0)]
    Usage(&'static str),
}

impl std::error::Error for CommandError {}

impl Command {
    /// Decodes one line such as `/move 3 5` or `/deposit 100 paypal`.
    ///
    /// # Errors
    ///
    /// [`CommandError`] for unknown words or malformed arguments.
    #[instrument]
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut words = text.split_whitespace();
        let head = words.next().ok_or(CommandError::Empty)?;
        let name = head.trim_start_matches('/').to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match name.as_str() {
            "play" => Command::Play {
                wager: number(&args, 0, "/play <amount>")?,
            },
            "play_bot" | "playbot" => Command::PlayBot {
                wager: number(&args, 0, "/play_bot <amount>")?,
            },
            "join" => Command::Join {
                match_id: number(&args, 0, "/join <match>")?,
            },
            "cancel" => Command::Cancel {
                match_id: number(&args, 0, "/cancel <match>")?,
            },
            "move" => {
                const USAGE: &str = "/move <match> <1-9>";
                let match_id = number(&args, 0, USAGE)?;
                let rest = args.get(1..).unwrap_or_default().join(" ");
                let position = Position::parse(&rest).ok_or(CommandError::Usage(USAGE))?;
                Command::Move { match_id, position }
            }
            "board" => Command::Board {
                match_id: number(&args, 0, "/board <match>")?,
            },
            "games" => Command::Games,
            "balance" => Command::Balance,
            "stats" => Command::Stats,
            "leaderboard" => Command::Leaderboard,
            "deposit" => {
                const USAGE: &str = "/deposit <amount> <paypal|vodafone|bank>";
                Command::Deposit {
                    amount: number(&args, 0, USAGE)?,
                    method: method(&args, 1, USAGE)?,
                }
            }
            "withdraw" => {
                const USAGE: &str = "/withdraw <amount> <paypal|vodafone|bank>";
                Command::Withdraw {
                    amount: number(&args, 0, USAGE)?,
                    method: method(&args, 1, USAGE)?,
                }
            }
            "pending" => Command::Pending,
            "approve" => Command::Approve {
                transaction_id: number(&args, 0, "/approve <transaction>")?,
            },
            "reject" => Command::Reject {
                transaction_id: number(&args, 0, "/reject <transaction>")?,
            },
            "settle" => Command::Settle {
                match_id: number(&args, 0, "/settle <match>")?,
            },
            "help" | "start" => Command::Help,
            _ => return Err(CommandError::Unknown(head.to_string())),
        };

        debug!(?command, "Command decoded");
        Ok(command)
    }

    /// Whether only admins may issue this command.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::Pending
                | Command::Approve { .. }
                | Command::Reject { .. }
                | Command::Settle { .. }
        )
    }
}

fn number<T: FromStr>(args: &[&str], index: usize, usage: &'static str) -> Result<T, CommandError> {
    args.get(index)
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::Usage(usage))
}

fn method(args: &[&str], index: usize, usage: &'static str) -> Result<PaymentMethod, CommandError> {
    args.get(index)
        .and_then(|s| PaymentMethod::from_str(&s.to_ascii_lowercase()).ok())
        .ok_or(CommandError::Usage(usage))
}

/// Text sent back to the user, plus the board when one is involved.
#[derive(Debug, Clone, PartialEq, Getters, Serialize)]
pub struct Reply {
    text: String,
    view: Option<MatchView>,
    error: Option<ErrorKind>,
}

impl Reply {
    fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            view: None,
            error: None,
        }
    }

    fn with_board(text: impl Into<String>, view: MatchView) -> Self {
        Self {
            text: text.into(),
            view: Some(view),
            error: None,
        }
    }

    fn failure(err: &ArenaError) -> Self {
        Self {
            text: format!("Error: {}", err),
            view: None,
            error: Some(err.kind()),
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Routes commands to the arena and the payment pipeline.
#[derive(Debug)]
pub struct Dispatcher<L> {
    arena: ArenaService<L>,
    payments: PaymentProcessor<L>,
    directory: Arc<L>,
}

impl<L: MatchBook + Identity> Dispatcher<L> {
    /// Creates a dispatcher over one ledger and participant directory.
    #[instrument(skip(ledger, config))]
    pub fn new(ledger: Arc<L>, config: &EconomyConfig) -> Self {
        info!("Creating Dispatcher");
        Self {
            arena: ArenaService::new(Arc::clone(&ledger), config),
            payments: PaymentProcessor::new(Arc::clone(&ledger), *config.fee_percent()),
            directory: ledger,
        }
    }

    /// Creates a dispatcher around an existing arena.
    pub fn with_arena(arena: ArenaService<L>, fee_percent: i64) -> Self {
        let ledger = Arc::clone(arena.ledger());
        Self {
            payments: PaymentProcessor::new(Arc::clone(&ledger), fee_percent),
            arena,
            directory: ledger,
        }
    }

    /// The match service.
    pub fn arena(&self) -> &ArenaService<L> {
        &self.arena
    }

    /// Decodes `text` and handles it.
    #[instrument(skip(self, name))]
    pub fn handle_text(&self, actor: ParticipantId, name: &str, text: &str) -> Reply {
        match Command::parse(text) {
            Ok(command) => self.handle(actor, name, command),
            Err(e) => {
                debug!(error = %e, "Unparseable command");
                Reply::message(e.to_string())
            }
        }
    }

    /// Handles one command for `actor`, registering them on first contact.
    #[instrument(skip(self, name))]
    pub fn handle(&self, actor: ParticipantId, name: &str, command: Command) -> Reply {
        let result = self
            .directory
            .ensure_participant(actor, name)
            .map_err(ArenaError::from)
            .and_then(|_| self.authorize(actor, &command))
            .and_then(|()| self.execute(actor, command));

        match result {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_retryable() {
                    error!(actor, error = %e, "Request failed");
                } else {
                    warn!(actor, error = %e, "Request refused");
                }
                Reply::failure(&e)
            }
        }
    }

    fn authorize(&self, actor: ParticipantId, command: &Command) -> Result<(), ArenaError> {
        if command.requires_admin() && !self.directory.is_admin(actor)? {
            return Err(ArenaError::Unauthorized);
        }
        Ok(())
    }

    fn execute(&self, actor: ParticipantId, command: Command) -> Result<Reply, ArenaError> {
        match command {
            Command::Play { wager } => {
                let view = self.arena.create_match(actor, wager, false)?;
                Ok(Reply::with_board(
                    format!(
                        "Match #{} created with a wager of {} points. \
                         Waiting for an opponent: /join {}",
                        view.id, view.wager, view.id
                    ),
                    view,
                ))
            }
            Command::PlayBot { wager } => {
                let view = self.arena.create_match(actor, wager, true)?;
                Ok(Reply::with_board(
                    format!(
                        "Match #{} against the bot for {} points. You play X.\n{}",
                        view.id,
                        view.wager,
                        view.grid()
                    ),
                    view,
                ))
            }
            Command::Join { match_id } => {
                let view = self.arena.join_match(match_id, actor)?;
                Ok(Reply::with_board(
                    format!("You joined match #{} as O. X moves first.\n{}", match_id, view.grid()),
                    view,
                ))
            }
            Command::Cancel { match_id } => {
                let view = self.arena.cancel_match(match_id, actor)?;
                Ok(Reply::message(format!(
                    "Match #{} cancelled. {} points returned.",
                    match_id, view.wager
                )))
            }
            Command::Move { match_id, position } => self.play(actor, match_id, position),
            Command::Board { match_id } => {
                let view = self.arena.view(match_id)?;
                Ok(Reply::with_board(
                    format!("Match #{} ({} to move)\n{}", match_id, view.turn, view.grid()),
                    view,
                ))
            }
            Command::Games => {
                let open = self.arena.open_matches();
                if open.is_empty() {
                    return Ok(Reply::message("No matches are waiting for an opponent."));
                }
                let lines: Vec<String> = open
                    .iter()
                    .map(|v| format!("#{}: {} points, /join {}", v.id, v.wager, v.id))
                    .collect();
                Ok(Reply::message(lines.join("\n")))
            }
            Command::Balance => {
                let points = self.arena.ledger().balance(actor)?;
                Ok(Reply::message(format!("Balance: {} points", points)))
            }
            Command::Stats => {
                let standing = self
                    .directory
                    .standing(actor)?
                    .ok_or(LedgerError::UnknownParticipant(actor))?;
                Ok(Reply::message(format!(
                    "{}: {} points, {} wins, {} losses, {} draws",
                    standing.display_name(),
                    standing.points(),
                    standing.wins(),
                    standing.losses(),
                    standing.draws()
                )))
            }
            Command::Leaderboard => {
                let top = self.directory.leaderboard(LEADERBOARD_SIZE)?;
                if top.is_empty() {
                    return Ok(Reply::message("The leaderboard is empty."));
                }
                let lines: Vec<String> = top
                    .iter()
                    .enumerate()
                    .map(|(rank, s)| {
                        format!(
                            "{}. {}: {} points ({}W/{}L/{}D)",
                            rank + 1,
                            s.display_name(),
                            s.points(),
                            s.wins(),
                            s.losses(),
                            s.draws()
                        )
                    })
                    .collect();
                Ok(Reply::message(lines.join("\n")))
            }
            Command::Deposit { amount, method } => {
                let id = self.payments.deposit(actor, amount, method)?;
                Ok(Reply::message(format!(
                    "Deposited {} points via {}. Transaction #{}.",
                    amount, method, id
                )))
            }
            Command::Withdraw { amount, method } => {
                let request = self.payments.withdraw(actor, amount, method)?;
                let quote = request.quote();
                Ok(Reply::message(format!(
                    "Withdrawal #{} of {} points via {} requested: \
                     you receive {} after a {} point fee. Awaiting admin approval.",
                    request.id(),
                    quote.amount(),
                    method,
                    quote.net(),
                    quote.fee()
                )))
            }
            Command::Pending => {
                let pending = self.payments.pending_withdrawals()?;
                if pending.is_empty() {
                    return Ok(Reply::message("No pending withdrawals."));
                }
                let lines: Vec<String> = pending
                    .iter()
                    .map(|t| {
                        format!(
                            "#{} participant {}: {}",
                            t.id(),
                            t.participant(),
                            t.detail().as_deref().unwrap_or("withdrawal")
                        )
                    })
                    .collect();
                Ok(Reply::message(lines.join("\n")))
            }
            Command::Approve { transaction_id } => {
                let record = self.payments.approve_withdrawal(transaction_id)?;
                Ok(Reply::message(format!(
                    "Withdrawal #{} approved for participant {}.",
                    record.id(),
                    record.participant()
                )))
            }
            Command::Reject { transaction_id } => {
                let record = self.payments.reject_withdrawal(transaction_id)?;
                Ok(Reply::message(format!(
                    "Withdrawal #{} rejected, {} points returned to participant {}.",
                    record.id(),
                    -*record.amount(),
                    record.participant()
                )))
            }
            Command::Settle { match_id } => {
                let settlement = self.arena.settle(match_id)?;
                Ok(Reply::message(format!(
                    "Match #{} settled: {} ({} records).",
                    match_id,
                    settlement.outcome(),
                    settlement.postings().len()
                )))
            }
            Command::Help => Ok(Reply::message(HELP)),
        }
    }

    /// Plays the actor's move; in bot matches also the engine's reply.
    /// Settles as soon as the match is over.
    fn play(
        &self,
        actor: ParticipantId,
        match_id: MatchId,
        position: Position,
    ) -> Result<Reply, ArenaError> {
        let mut view = self.arena.submit_move(match_id, actor, position.to_index())?;
        let mut text = format!("You played {}.", position);

        if view.outcome.is_none() && view.vs_bot {
            let (reply, after) = self.arena.request_bot_move(match_id)?;
            let bot_square = Position::from_index(reply)
                .map(|p| p.to_string())
                .unwrap_or_else(|| (reply + 1).to_string());
            text.push_str(&format!(" The bot played {}.", bot_square));
            view = after;
        }

        text.push('\n');
        text.push_str(&view.grid());

        if view.outcome.is_some() {
            text.push('\n');
            match self.arena.settle(match_id) {
                Ok(settlement) => text.push_str(&result_line(&view, &settlement, actor)),
                Err(e) => {
                    error!(match_id, error = %e, "Finished match left unsettled");
                    text.push_str(&format!(
                        "The match is over but settlement failed: {}. \
                         An admin can retry with /settle {}.",
                        e, match_id
                    ));
                    return Ok(Reply {
                        text,
                        view: Some(view),
                        error: Some(e.kind()),
                    });
                }
            }
        }

        Ok(Reply::with_board(text, view))
    }
}

fn result_line(view: &MatchView, settlement: &Settlement, actor: ParticipantId) -> String {
    // Balance change against the balance before the stake was taken.
    let change = settlement.net_change(actor) - view.wager;
    let headline = match settlement.outcome() {
        Outcome::Draw => "Draw.".to_string(),
        Outcome::Void => "Match cancelled.".to_string(),
        outcome => {
            let winner = match outcome.winner() {
                Some(Seat::A) => Some(view.seat_a),
                Some(Seat::B) => view.seat_b,
                None => None,
            };
            match winner {
                Some(id) if id == actor => "You win!".to_string(),
                Some(id) => format!("Participant {} wins.", id),
                None => "The bot wins.".to_string(),
            }
        }
    };
    format!("{} Points change: {:+}", headline, change)
}

const HELP: &str = "\
/play <amount> - open a match against another player
/play_bot <amount> - play against the bot
/join <match> - join a waiting match
/cancel <match> - cancel your waiting match (wager refunded)
/move <match> <1-9> - place your mark
/board <match> - show a board
/games - list matches waiting for an opponent
/balance - show your points
/stats - show your record
/leaderboard - top players
/deposit <amount> <paypal|vodafone|bank> - buy points
/withdraw <amount> <paypal|vodafone|bank> - cash out (fee applies)
Admin: /pending, /approve <tx>, /reject <tx>, /settle <match>";
