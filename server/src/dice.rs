//! Random sources for dice rolls and bot tie-breaks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Randomness consumed by a game session.
pub trait RandomSource: Send {
    /// A die face in `1..=6`.
    fn roll_die(&mut self) -> u8;
    /// An index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform dice backed by `StdRng`.
pub struct SeededDice {
    rng: StdRng,
}

impl SeededDice {
    /// Seeds from the operating system when `seed` is `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl RandomSource for SeededDice {
    fn roll_die(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }

    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Replays a fixed list of rolls and picks, then falls back to seeded dice.
pub struct ScriptedDice {
    rolls: VecDeque<u8>,
    picks: VecDeque<usize>,
    fallback: SeededDice,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            picks: VecDeque::new(),
            fallback: SeededDice::new(Some(0)),
        }
    }

    pub fn with_picks(mut self, picks: impl IntoIterator<Item = usize>) -> Self {
        self.picks = picks.into_iter().collect();
        self
    }

    pub fn remaining_rolls(&self) -> usize {
        self.rolls.len()
    }
}

impl RandomSource for ScriptedDice {
    fn roll_die(&mut self) -> u8 {
        match self.rolls.pop_front() {
            Some(roll) => roll.clamp(1, 6),
            None => self.fallback.roll_die(),
        }
    }

    fn pick(&mut self, len: usize) -> usize {
        match self.picks.pop_front() {
            Some(pick) => pick.min(len - 1),
            None => self.fallback.pick(len),
        }
    }
}
