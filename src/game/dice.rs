//! Die sources for order rolls and turns

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;

/// A six-sided die
pub trait DieSource: Send {
    /// Roll once, returning 1..=6
    fn roll(&mut self) -> u8;
}

/// Builds a fresh die for each active player
pub type DieFactory = Arc<dyn Fn() -> Box<dyn DieSource> + Send + Sync>;

/// Default factory handing out entropy-seeded dice
pub fn random_dice() -> DieFactory {
    Arc::new(|| Box::new(RandomDie::new()) as Box<dyn DieSource>)
}

/// Entropy-seeded fair die
#[derive(Debug)]
pub struct RandomDie {
    rng: StdRng,
}

impl RandomDie {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic die, for reproducible simulations
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDie {
    fn default() -> Self {
        Self::new()
    }
}

impl DieSource for RandomDie {
    fn roll(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }
}

/// Die that replays a fixed sequence, then keeps rolling 1
#[derive(Debug, Clone, Default)]
pub struct ScriptedDie {
    rolls: VecDeque<u8>,
}

impl ScriptedDie {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }

    /// Rolls not yet consumed
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl DieSource for ScriptedDie {
    fn roll(&mut self) -> u8 {
        self.rolls.pop_front().unwrap_or(1)
    }
}
