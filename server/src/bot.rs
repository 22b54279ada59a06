//! Move selection for bot-controlled colors.

use crate::dice::RandomSource;
use shared::{PlayerState, EXIT_ROLL};

/// Chooses which token a bot moves with `roll`.
///
/// A six brings a token out of home whenever one can leave (uniformly random
/// among the home tokens). Otherwise the furthest-along movable token moves,
/// ties going to the lowest index. Returns `None` when nothing can move.
pub fn choose_token(
    player: &PlayerState,
    roll: u8,
    random: &mut dyn RandomSource,
) -> Option<usize> {
    let movable = player.movable_tokens(roll);
    if movable.is_empty() {
        return None;
    }

    if roll == EXIT_ROLL {
        let home: Vec<usize> = movable
            .iter()
            .copied()
            .filter(|&index| player.tokens[index].is_home())
            .collect();
        if !home.is_empty() {
            return Some(home[random.pick(home.len())]);
        }
    }

    let mut best: Option<(usize, i32)> = None;
    for index in movable {
        let progress = player.tokens[index]
            .steps()
            .map(i32::from)
            .unwrap_or(-100);
        match best {
            Some((_, best_progress)) if best_progress >= progress => {}
            _ => best = Some((index, progress)),
        }
    }
    best.map(|(index, _)| index)
}
