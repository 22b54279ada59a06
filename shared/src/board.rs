//! Board geometry and token positions.
//!
//! Every color walks the same 52-cell circular track, starting at its own
//! offset, then turns into a private home stretch. Positions are counted in
//! steps relative to the color's start; only captures need the absolute cell.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const TRACK_LENGTH: u8 = 52;
pub const LAST_TRACK_STEP: u8 = TRACK_LENGTH - 1;
/// Steps from leaving home to reaching the center.
pub const FINISH_STEPS: u8 = 57;
pub const TOKENS_PER_PLAYER: usize = 4;
pub const EXIT_ROLL: u8 = 6;
pub const SAFE_CELLS: [u8; 8] = [0, 8, 13, 21, 26, 34, 39, 47];

pub const HOME_WIRE: i32 = -1;
pub const FINISHED_WIRE: i32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl Color {
    /// Canonical seating order, also the 4-player turn order.
    pub const ALL: [Color; 4] = [Color::Red, Color::Green, Color::Yellow, Color::Blue];

    pub fn index(self) -> usize {
        match self {
            Color::Red => 0,
            Color::Green => 1,
            Color::Yellow => 2,
            Color::Blue => 3,
        }
    }

    /// Offset of this color's first track cell on the shared track.
    pub fn path_start(self) -> u8 {
        self.index() as u8 * 13
    }

    /// The color seated across the board.
    pub fn opposite(self) -> Color {
        match self {
            Color::Red => Color::Yellow,
            Color::Yellow => Color::Red,
            Color::Green => Color::Blue,
            Color::Blue => Color::Green,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown color '{0}'")]
pub struct UnknownColor(pub String);

impl FromStr for Color {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Color::Red),
            "green" => Ok(Color::Green),
            "yellow" => Ok(Color::Yellow),
            "blue" => Ok(Color::Blue),
            _ => Err(UnknownColor(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0} is not a valid token position")]
pub struct InvalidPosition(pub i32);

/// Where a single token is.
///
/// On the wire this is the integer encoding used by the browser client:
/// `-1` home, `0..=51` track steps, `52..=56` home stretch, `99` finished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum TokenPosition {
    #[default]
    Home,
    /// Steps taken along the shared track, 0..=51.
    Track(u8),
    /// Cell of the private home stretch, 0..=4.
    HomeStretch(u8),
    Finished,
}

impl TokenPosition {
    /// Position reached after `steps` steps from the start cell.
    pub fn from_steps(steps: u8) -> Option<TokenPosition> {
        match steps {
            0..=LAST_TRACK_STEP => Some(TokenPosition::Track(steps)),
            s if s < FINISH_STEPS => Some(TokenPosition::HomeStretch(s - TRACK_LENGTH)),
            FINISH_STEPS => Some(TokenPosition::Finished),
            _ => None,
        }
    }

    /// Steps taken since leaving home, `None` for home and finished tokens.
    pub fn steps(self) -> Option<u8> {
        match self {
            TokenPosition::Track(n) => Some(n),
            TokenPosition::HomeStretch(n) => Some(TRACK_LENGTH + n),
            TokenPosition::Home | TokenPosition::Finished => None,
        }
    }

    /// Where this token ends up after moving `roll` cells, or `None` when the
    /// move is not legal.
    pub fn advance(self, roll: u8) -> Option<TokenPosition> {
        match self {
            TokenPosition::Home if roll == EXIT_ROLL => Some(TokenPosition::Track(0)),
            TokenPosition::Home | TokenPosition::Finished => None,
            _ => {
                let target = self.steps()?.checked_add(roll)?;
                TokenPosition::from_steps(target)
            }
        }
    }

    /// Cell on the shared track, `None` when off the track.
    pub fn absolute_cell(self, color: Color) -> Option<u8> {
        match self {
            TokenPosition::Track(n) => Some((color.path_start() + n) % TRACK_LENGTH),
            _ => None,
        }
    }

    pub fn is_home(self) -> bool {
        self == TokenPosition::Home
    }

    pub fn is_finished(self) -> bool {
        self == TokenPosition::Finished
    }

    pub fn to_wire(self) -> i32 {
        match self {
            TokenPosition::Home => HOME_WIRE,
            TokenPosition::Finished => FINISHED_WIRE,
            other => other.steps().map(i32::from).unwrap_or(HOME_WIRE),
        }
    }

    pub fn from_wire(value: i32) -> Result<TokenPosition, InvalidPosition> {
        match value {
            HOME_WIRE => Ok(TokenPosition::Home),
            FINISHED_WIRE => Ok(TokenPosition::Finished),
            0..=56 => TokenPosition::from_steps(value as u8).ok_or(InvalidPosition(value)),
            _ => Err(InvalidPosition(value)),
        }
    }
}

impl From<TokenPosition> for i32 {
    fn from(position: TokenPosition) -> i32 {
        position.to_wire()
    }
}

impl TryFrom<i32> for TokenPosition {
    type Error = InvalidPosition;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        TokenPosition::from_wire(value)
    }
}

pub fn is_safe_cell(cell: u8) -> bool {
    SAFE_CELLS.contains(&cell)
}

/// One color's four tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub tokens: [TokenPosition; TOKENS_PER_PLAYER],
    pub path_start: u8,
}

impl PlayerState {
    pub fn new(color: Color) -> Self {
        Self {
            tokens: [TokenPosition::Home; TOKENS_PER_PLAYER],
            path_start: color.path_start(),
        }
    }

    pub fn reset(&mut self) {
        self.tokens = [TokenPosition::Home; TOKENS_PER_PLAYER];
    }

    /// Indices of the tokens that can legally move `roll` cells.
    pub fn movable_tokens(&self, roll: u8) -> Vec<usize> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.advance(roll).is_some())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn has_legal_move(&self, roll: u8) -> bool {
        self.tokens.iter().any(|token| token.advance(roll).is_some())
    }

    pub fn all_finished(&self) -> bool {
        self.tokens.iter().all(|token| token.is_finished())
    }
}
