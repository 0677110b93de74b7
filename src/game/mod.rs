//! Gameplay: dice, the turn engine, sessions and the game worker

pub mod dice;
pub mod session;
pub mod turn;
pub mod worker;

pub use dice::{random_dice, DieFactory, DieSource, RandomDie, ScriptedDie};
pub use session::{ActivePlayer, Forfeit, GameRules, GameSession, GameSummary, ScoreSlots};
pub use turn::{Command, RollResult, TurnState};
pub use worker::{GameSlot, GameWorker};
