//! Error types for the Chance-It server
//!
//! Service plumbing uses anyhow for consistent error handling, while the
//! domain-specific failures below are expressed with thiserror.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific game server scenarios
#[derive(Debug, thiserror::Error)]
pub enum ChanceItError {
    #[error("Hand-off failed for registration {registration_id}: {reason}")]
    HandOffFailed {
        registration_id: String,
        reason: String,
    },

    #[error("Outcome log write failed: {message}")]
    OutcomeLog { message: String },
}
