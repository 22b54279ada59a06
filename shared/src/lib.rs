//! Types shared by the Ludo server and its clients: the board model and the
//! wire protocol.

pub mod board;
pub mod protocol;

pub use board::{
    is_safe_cell, Color, InvalidPosition, PlayerState, TokenPosition, UnknownColor, EXIT_ROLL,
    FINISH_STEPS, SAFE_CELLS, TOKENS_PER_PLAYER, TRACK_LENGTH,
};
pub use protocol::{
    ClientMessage, Encoding, GameMode, GameSnapshot, ProtocolError, ServerMessage, DEFAULT_ROOM,
};
