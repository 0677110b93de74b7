//! Common types used throughout the Chance-It server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a registration (one waiting client)
pub type RegistrationId = Uuid;

/// Unique identifier for games
pub type GameId = Uuid;

/// Client request to register with a display name
pub const HELLO_PREFIX: &str = "HELLO:";

/// Client request to withdraw before being paired
pub const GOODBYE_PREFIX: &str = "GOODBYE:";

/// Server acknowledgement of a valid HELLO
pub const HELLO_ACK: &str = "IS IT ME YOU'RE LOOKIN FOR?";

/// Prompt sent before every gameplay read
pub const CHANCE_IT_PROMPT: &str = "chance-it? [Y/n]";

pub const WINNER_MESSAGE: &str = "You Win!";
pub const LOSER_MESSAGE: &str = "You Lose.";
pub const TIE_MESSAGE: &str = "It's a Draw.";

/// Header line of the outcome log
pub const OUTCOME_LOG_HEADER: &str = "winner,wscore,loser,lscore,how";

/// Wait-state of a registration.
///
/// Valid transitions:
/// `AwaitingGreeting -> AwaitingWithdrawal -> AwaitingQueueRemoval` (unregistered) or
/// `AwaitingWithdrawal -> AwaitingTurn` (absorbed into a game).
/// A failed queue removal (already claimed) continues on to `AwaitingTurn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WaitState {
    #[default]
    AwaitingGreeting,
    AwaitingWithdrawal,
    AwaitingQueueRemoval,
    AwaitingTurn,
}

impl WaitState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: WaitState) -> bool {
        matches!(
            (self, next),
            (WaitState::AwaitingGreeting, WaitState::AwaitingWithdrawal)
                | (WaitState::AwaitingWithdrawal, WaitState::AwaitingQueueRemoval)
                | (WaitState::AwaitingWithdrawal, WaitState::AwaitingTurn)
                | (WaitState::AwaitingQueueRemoval, WaitState::AwaitingTurn)
        )
    }
}

impl std::fmt::Display for WaitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitState::AwaitingGreeting => write!(f, "AWAITING_GREETING"),
            WaitState::AwaitingWithdrawal => write!(f, "AWAITING_WITHDRAWAL"),
            WaitState::AwaitingQueueRemoval => write!(f, "AWAITING_QUEUE_REMOVAL"),
            WaitState::AwaitingTurn => write!(f, "AWAITING_TURN"),
        }
    }
}

/// How a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    FairPlay,
    FairPlayTie,
    Timeout,
    Disconnect,
    Stop,
}

impl Reason {
    /// Whether this reason is a forfeiture
    pub fn is_forfeit(self) -> bool {
        matches!(self, Reason::Timeout | Reason::Disconnect | Reason::Stop)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reason::FairPlay => "FAIR_PLAY",
            Reason::FairPlayTie => "FAIR_PLAY_TIE",
            Reason::Timeout => "TIMEOUT",
            Reason::Disconnect => "DISCONNECT",
            Reason::Stop => "STOP",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a finished game as it appears in the outcome log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub name: String,
    pub score: u32,
}

/// Write-once record of a completed game.
///
/// For `FairPlayTie` the winner/loser slots are an unordered pair; the slot
/// assignment only keeps the record shape symmetric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub game_id: GameId,
    pub winner: Standing,
    pub loser: Standing,
    pub reason: Reason,
    pub finished_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Render the record as a single outcome log line (no trailing newline)
    pub fn to_log_line(&self) -> String {
        format!(
            "WINNER:{},score:{},LOSER:{},score:{},HOW:{}",
            self.winner.name, self.winner.score, self.loser.name, self.loser.score, self.reason
        )
    }
}
