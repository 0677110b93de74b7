//! Matchmaking: the FIFO queue and the registrations that wait in it

pub mod queue;
pub mod registration;

pub use queue::{MatchmakingQueue, QueueStats, WithdrawOutcome};
pub use registration::{ClaimSignal, ClaimedTicket, HandOff, HandOffReply, Registration, Ticket};
