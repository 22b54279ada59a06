//! Messages exchanged between clients and the server.
//!
//! The same serde model travels in two encodings: JSON in websocket text
//! frames (browsers) and bincode in binary frames (the native client).

use crate::board::{Color, PlayerState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Room every connection starts in.
pub const DEFAULT_ROOM: &str = "MAIN";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// One human against bots.
    Computer,
    /// Every active color is played by a human.
    Multiplayer,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Computer => f.write_str("computer"),
            GameMode::Multiplayer => f.write_str("multiplayer"),
        }
    }
}

/// Full state of one session, broadcast after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub mode: Option<GameMode>,
    pub num_players: u8,
    pub active_colors: Vec<Color>,
    pub user_color: Option<Color>,
    pub turn: Option<Color>,
    pub rolled_value: Option<u8>,
    pub can_move: bool,
    pub players: BTreeMap<Color, PlayerState>,
    pub log: String,
    pub game_started: bool,
    pub winner: Option<Color>,
}

impl GameSnapshot {
    pub fn player(&self, color: Color) -> Option<&PlayerState> {
        self.players.get(&color)
    }

    /// Whether `color` is played by a bot in this snapshot.
    pub fn is_bot(&self, color: Color) -> bool {
        self.mode == Some(GameMode::Computer) && self.user_color != Some(color)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    StartGame {
        mode: GameMode,
        num_players: u8,
        #[serde(default)]
        user_color: Option<Color>,
    },
    RollDice,
    MoveToken {
        token_index: usize,
    },
    CreateRoom,
    JoinRoom {
        code: String,
        #[serde(default)]
        color: Option<Color>,
    },
    Ping {
        timestamp: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    Connected { client_id: u32 },
    RoomJoined { code: String, seat: Option<Color> },
    UpdateState(GameSnapshot),
    Rejected { reason: String },
    Pong { timestamp: u64 },
}

/// Frame encoding chosen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    Bincode,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid binary frame: {0}")]
    Bincode(#[from] bincode::Error),
}

pub fn encode_json<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_json<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_binary<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(bincode::serialize(message)?)
}

pub fn decode_binary<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}
