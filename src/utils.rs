//! Utility functions for the Chance-It server

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique registration ID
pub fn generate_registration_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique game ID
pub fn generate_game_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Extract a non-empty argument following `prefix`, e.g. the name in `HELLO:<name>`
pub fn parse_named_command<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix).filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_registration_id();
        let id2 = generate_registration_id();
        assert_ne!(id1, id2);

        let game_id1 = generate_game_id();
        let game_id2 = generate_game_id();
        assert_ne!(game_id1, game_id2);
    }

    #[test]
    fn test_parse_named_command() {
        assert_eq!(parse_named_command("HELLO:McLovin", "HELLO:"), Some("McLovin"));
        assert_eq!(parse_named_command("HELLO:", "HELLO:"), None);
        assert_eq!(parse_named_command("HELLO", "HELLO:"), None);
        assert_eq!(parse_named_command("GOODBYE:x", "HELLO:"), None);
        assert_eq!(parse_named_command("GOODBYE:x", "GOODBYE:"), Some("x"));
    }
}
