//! Turn engine: command parsing, the bust rule, and the status block

/// A player's answer to the `chance-it?` prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Re-roll both dice, risking the turn total
    ChanceIt,
    /// End the turn and keep the turn total
    Hold,
    /// Abandon the whole game
    Stop,
    /// Anything else; the prompt is repeated
    Unrecognized,
}

impl Command {
    /// Interpret one input line. Empty means the default answer, `Y`.
    pub fn parse(line: &str) -> Self {
        if line.is_empty() || line.starts_with('Y') || line.starts_with("chance-it") {
            Command::ChanceIt
        } else if line.starts_with('n') {
            Command::Hold
        } else if line.starts_with("stop") {
            Command::Stop
        } else {
            Command::Unrecognized
        }
    }
}

/// Result of a re-roll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollResult {
    /// The roll was added to the turn total
    Added,
    /// The roll matched the first roll's sum; the turn total is lost
    Bust,
}

/// Score bookkeeping for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnState {
    first_sum: u32,
    accumulated: u32,
    roll_number: u32,
    last_roll: (u8, u8),
}

impl TurnState {
    /// Begin a turn with its first roll
    pub fn start(die1: u8, die2: u8) -> Self {
        let sum = u32::from(die1) + u32::from(die2);
        Self {
            first_sum: sum,
            accumulated: sum,
            roll_number: 1,
            last_roll: (die1, die2),
        }
    }

    /// Apply a re-roll. Matching the first roll's sum zeroes the turn.
    pub fn reroll(&mut self, die1: u8, die2: u8) -> RollResult {
        let sum = u32::from(die1) + u32::from(die2);
        self.roll_number += 1;
        self.last_roll = (die1, die2);

        if sum == self.first_sum {
            self.accumulated = 0;
            RollResult::Bust
        } else {
            self.accumulated += sum;
            RollResult::Added
        }
    }

    pub fn first_sum(&self) -> u32 {
        self.first_sum
    }

    pub fn accumulated(&self) -> u32 {
        self.accumulated
    }

    pub fn roll_number(&self) -> u32 {
        self.roll_number
    }

    pub fn last_roll(&self) -> (u8, u8) {
        self.last_roll
    }

    pub fn last_sum(&self) -> u32 {
        u32::from(self.last_roll.0) + u32::from(self.last_roll.1)
    }
}

/// Status block shown to the turn-taker after every roll
pub fn status_block(turn_number: u32, state: &TurnState, my_score: u32, their_score: u32) -> String {
    let (die1, die2) = state.last_roll();
    format!(
        "Turn#: {}\nRoll#: {}\nTurn Starting Score: {}-{}\nRunning Turn Score: {}\nRoll Score: {}\nYou Rolled: [{},{}]\n--",
        turn_number,
        state.roll_number(),
        my_score,
        their_score,
        state.accumulated(),
        state.last_sum(),
        die1,
        die2
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse(""), Command::ChanceIt);
        assert_eq!(Command::parse("Y"), Command::ChanceIt);
        assert_eq!(Command::parse("Yes please"), Command::ChanceIt);
        assert_eq!(Command::parse("chance-it"), Command::ChanceIt);
        assert_eq!(Command::parse("n"), Command::Hold);
        assert_eq!(Command::parse("no"), Command::Hold);
        assert_eq!(Command::parse("stop"), Command::Stop);
        assert_eq!(Command::parse("stop now"), Command::Stop);
        assert_eq!(Command::parse("y"), Command::Unrecognized);
        assert_eq!(Command::parse("N"), Command::Unrecognized);
        assert_eq!(Command::parse("maybe"), Command::Unrecognized);
    }

    #[test]
    fn test_bust_example() {
        let mut turn = TurnState::start(2, 2);
        assert_eq!(turn.accumulated(), 4);
        assert_eq!(turn.reroll(1, 3), RollResult::Bust);
        assert_eq!(turn.accumulated(), 0);
    }

    #[test]
    fn test_status_block_format() {
        let turn = TurnState::start(3, 4);
        assert_eq!(
            status_block(1, &turn, 0, 5),
            "Turn#: 1\nRoll#: 1\nTurn Starting Score: 0-5\nRunning Turn Score: 7\nRoll Score: 7\nYou Rolled: [3,4]\n--"
        );
    }

    proptest! {
        #[test]
        fn prop_bust_rule(
            first in (1u8..=6, 1u8..=6),
            rerolls in proptest::collection::vec((1u8..=6, 1u8..=6), 1..20),
        ) {
            let mut turn = TurnState::start(first.0, first.1);
            let first_sum = u32::from(first.0) + u32::from(first.1);
            let mut expected = first_sum;

            for (d1, d2) in rerolls {
                let sum = u32::from(d1) + u32::from(d2);
                let result = turn.reroll(d1, d2);
                if sum == first_sum {
                    prop_assert_eq!(result, RollResult::Bust);
                    prop_assert_eq!(turn.accumulated(), 0);
                    break;
                }
                expected += sum;
                prop_assert_eq!(result, RollResult::Added);
                prop_assert_eq!(turn.accumulated(), expected);
            }
        }
    }
}
