//! # Ludo Server Library
//!
//! Authoritative server for networked Ludo. The server owns the canonical
//! game state of every room, validates each intent against the rules, plays
//! the bot colors, and pushes full snapshots to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Clients only send intents (start, roll, move). Dice are rolled here and
//! every decision about legality, captures, extra turns and winning is made
//! here. Clients simply render whatever snapshot arrives.
//!
//! ### Pacing and Bots
//! Automatic steps (passing a turn with no legal move, handing over after a
//! move, bot thinking time) are scheduled continuations. They are revalidated
//! when they fire, so a delay never applies to a state that has moved on.
//!
//! ### Rooms and Connections
//! Connections start in the default room and may create or join others by
//! code. Idle connections are pinged and eventually dropped; rooms nobody
//! watches are closed.
//!
//! ## Module Organization
//!
//! - `game`: the synchronous rules engine and its effects
//! - `bot`: token choice for computer-controlled colors
//! - `dice`: pluggable randomness (seeded or scripted)
//! - `session`: the per-room actor task that owns a game
//! - `rooms`: join codes mapped to sessions
//! - `client_manager`: connection bookkeeping and timeouts
//! - `network`: axum websocket transport
//! - `config`: command-line configuration and pacing

pub mod bot;
pub mod client_manager;
pub mod config;
pub mod dice;
pub mod game;
pub mod network;
pub mod rooms;
pub mod session;
