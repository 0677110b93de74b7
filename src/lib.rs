//! Chance-It - pooled multiplayer dice game server
//!
//! This crate provides a line-oriented TCP server that registers players,
//! pairs them in arrival order, and referees two-player games of Chance-It
//! with fixed pools of recycled registrar and game workers.

pub mod config;
pub mod error;
pub mod game;
pub mod matchmaking;
pub mod metrics;
pub mod net;
pub mod outcome;
pub mod pool;
pub mod registrar;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ChanceItError, Result};
pub use types::*;

// Re-export key components
pub use matchmaking::MatchmakingQueue;
pub use outcome::{CsvOutcomeLog, MemoryOutcomeLog, OutcomeLog};
pub use service::AppState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
