//! Room registry mapping join codes to running sessions.
//!
//! The default room always exists so that clients which never ask for a
//! room still share one board.

use crate::config::Pacing;
use crate::dice::SeededDice;
use crate::session::SessionHandle;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

pub use shared::DEFAULT_ROOM;

/// Join-code characters. `0`, `O`, `1` and `I` are left out.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;

pub struct RoomRegistry {
    rooms: HashMap<String, SessionHandle>,
    pacing: Pacing,
    seed: Option<u64>,
    rng: StdRng,
    created: u64,
}

impl RoomRegistry {
    /// Creates the registry and spawns the default room.
    ///
    /// Must be called inside a tokio runtime. With a seed, every room gets
    /// its own deterministic dice derived from it.
    pub fn new(pacing: Pacing, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut registry = Self {
            rooms: HashMap::new(),
            pacing,
            seed,
            rng,
            created: 0,
        };
        registry.spawn_room(DEFAULT_ROOM.to_string());
        registry
    }

    /// Opens a fresh room under a newly generated code.
    pub fn create_room(&mut self) -> SessionHandle {
        let code = loop {
            let candidate = self.generate_code();
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        self.spawn_room(code)
    }

    pub fn get(&self, code: &str) -> Option<SessionHandle> {
        self.rooms.get(&normalize(code)).cloned()
    }

    /// Shuts down and forgets a room. The default room is never removed.
    pub fn remove(&mut self, code: &str) -> bool {
        let code = normalize(code);
        if code == DEFAULT_ROOM {
            return false;
        }
        match self.rooms.remove(&code) {
            Some(session) => {
                session.shutdown();
                info!("Room {} closed", code);
                true
            }
            None => false,
        }
    }

    pub fn default_room(&self) -> Option<SessionHandle> {
        self.rooms.get(DEFAULT_ROOM).cloned()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn spawn_room(&mut self, code: String) -> SessionHandle {
        let seed = self.seed.map(|seed| seed.wrapping_add(self.created));
        self.created += 1;

        let session = SessionHandle::spawn(
            code.clone(),
            self.pacing,
            Box::new(SeededDice::new(seed)),
        );
        info!("Room {} opened", code);
        self.rooms.insert(code, session.clone());
        session
    }

    fn generate_code(&mut self) -> String {
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[self.rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Actor, Intent};
    use shared::{Color, GameMode};

    #[tokio::test]
    async fn test_default_room_exists() {
        let rooms = RoomRegistry::new(Pacing::instant(), Some(1));
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms.default_room().unwrap().id(), DEFAULT_ROOM);
        assert!(rooms.get("main").is_some());
    }

    #[tokio::test]
    async fn test_create_room_codes() {
        let mut rooms = RoomRegistry::new(Pacing::instant(), Some(1));
        let first = rooms.create_room();
        let second = rooms.create_room();

        for code in [first.id(), second.id()] {
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
        assert_ne!(first.id(), second.id());
        assert_eq!(rooms.len(), 3);
        assert!(rooms.get(first.id()).is_some());
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let mut rooms = RoomRegistry::new(Pacing::instant(), Some(7));
        let room = rooms.create_room();
        let lower = room.id().to_ascii_lowercase();
        assert_eq!(rooms.get(&format!(" {} ", lower)).unwrap().id(), room.id());
        assert!(rooms.get("ZZZZZZZ").is_none());
    }

    #[tokio::test]
    async fn test_remove_shuts_session_down() {
        let mut rooms = RoomRegistry::new(Pacing::instant(), Some(3));
        let room = rooms.create_room();
        let code = room.id().to_string();

        assert!(rooms.remove(&code));
        assert!(!rooms.remove(&code));
        assert!(rooms.get(&code).is_none());

        let result = room
            .submit(
                Actor::human(),
                Intent::StartGame {
                    mode: GameMode::Computer,
                    num_players: 2,
                    user_color: Some(Color::Red),
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_default_room_cannot_be_removed() {
        let mut rooms = RoomRegistry::new(Pacing::instant(), None);
        assert!(!rooms.remove(DEFAULT_ROOM));
        assert!(!rooms.remove("main"));
        assert_eq!(rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_rooms_are_independent() {
        let mut rooms = RoomRegistry::new(Pacing::instant(), Some(5));
        let room = rooms.create_room();
        room.submit(
            Actor::human(),
            Intent::StartGame {
                mode: GameMode::Multiplayer,
                num_players: 4,
                user_color: None,
            },
        )
        .await
        .unwrap();

        assert!(room.snapshot().await.unwrap().game_started);
        let main = rooms.default_room().unwrap();
        assert!(!main.snapshot().await.unwrap().game_started);
    }
}
