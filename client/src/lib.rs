//! # Ludo Client Library
//!
//! Terminal client for the Ludo server. The server is authoritative: this
//! crate only sends intents and prints whatever state comes back.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Local view of the session:
//! - Latest snapshot, room code and claimed seat
//! - Whose turn it is from this client's point of view
//! - Movable tokens and a one-line summary
//! - The next action when playing automatically
//!
//! ### Input Module (`input`)
//! Parses typed command lines (`roll`, `move 2`, `join AB3K9Z red`, ...)
//! into protocol messages.
//!
//! ### Network Module (`network`)
//! Websocket connection to the server, speaking JSON text frames or bincode
//! binary frames.

pub mod game;
pub mod input;
pub mod network;
