//! Networking: the shared acceptor and line-oriented connections

pub mod acceptor;
pub mod connection;

pub use acceptor::Acceptor;
pub use connection::{Connection, ReadOutcome};
