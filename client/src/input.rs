//! Turns typed command lines into protocol messages

use shared::{ClientMessage, Color, GameMode, UnknownColor, TOKENS_PER_PLAYER};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// What the user asked for on one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(ClientMessage),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error(transparent)]
    Color(#[from] UnknownColor),
    #[error("token index must be between 0 and {}", TOKENS_PER_PLAYER - 1)]
    TokenIndex,
}

pub const HELP: &str = "commands: start computer <2|4> <color> | start multiplayer <2|4> | \
roll | move <0-3> | create | join <code> [color] | ping | quit";

/// Parses one line of user input.
pub fn parse_line(line: &str) -> Result<Command, InputError> {
    let words: Vec<String> = line
        .split_whitespace()
        .map(|word| word.to_ascii_lowercase())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    let message = match words.as_slice() {
        [] => return Err(InputError::Empty),
        ["help"] | ["?"] => return Ok(Command::Help),
        ["quit"] | ["exit"] => return Ok(Command::Quit),
        ["roll"] | ["r"] => ClientMessage::RollDice,
        ["move", index] | ["m", index] => {
            let token_index: usize = index.parse().map_err(|_| InputError::TokenIndex)?;
            if token_index >= TOKENS_PER_PLAYER {
                return Err(InputError::TokenIndex);
            }
            ClientMessage::MoveToken { token_index }
        }
        ["start", "computer", count, color] => ClientMessage::StartGame {
            mode: GameMode::Computer,
            num_players: parse_count(count)?,
            user_color: Some(color.parse::<Color>()?),
        },
        ["start", "multiplayer", count] => ClientMessage::StartGame {
            mode: GameMode::Multiplayer,
            num_players: parse_count(count)?,
            user_color: None,
        },
        ["start", ..] => {
            return Err(InputError::Usage(
                "start computer <2|4> <color> | start multiplayer <2|4>",
            ))
        }
        ["create"] => ClientMessage::CreateRoom,
        ["join", code] => ClientMessage::JoinRoom {
            code: code.to_ascii_uppercase(),
            color: None,
        },
        ["join", code, color] => ClientMessage::JoinRoom {
            code: code.to_ascii_uppercase(),
            color: Some(color.parse::<Color>()?),
        },
        ["join", ..] => return Err(InputError::Usage("join <code> [color]")),
        ["ping"] => ClientMessage::Ping {
            timestamp: timestamp_ms(),
        },
        [other, ..] => return Err(InputError::Unknown(other.to_string())),
    };

    Ok(Command::Send(message))
}

fn parse_count(count: &str) -> Result<u8, InputError> {
    count
        .parse()
        .map_err(|_| InputError::Usage("player count must be a number"))
}

/// Milliseconds since the Unix epoch, used for ping round trips
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
