//! Client-side view of the game: the latest server snapshot plus what this
//! client is allowed to do with it.

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{ClientMessage, Color, GameMode, GameSnapshot, ServerMessage, TokenPosition};

/// Everything the client knows about its session
#[derive(Debug, Default)]
pub struct ClientGameState {
    pub client_id: Option<u32>,
    pub room: Option<String>,
    pub seat: Option<Color>,
    pub snapshot: Option<GameSnapshot>,
    pub last_rejection: Option<String>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a server message into the local view.
    ///
    /// Returns true when a new snapshot arrived.
    pub fn apply(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                false
            }
            ServerMessage::RoomJoined { code, seat } => {
                info!("Joined room {} (seat: {:?})", code, seat);
                self.room = Some(code);
                self.seat = seat;
                false
            }
            ServerMessage::UpdateState(snapshot) => {
                self.snapshot = Some(snapshot);
                self.last_rejection = None;
                true
            }
            ServerMessage::Rejected { reason } => {
                warn!("Rejected: {}", reason);
                self.last_rejection = Some(reason);
                false
            }
            ServerMessage::Pong { timestamp } => {
                debug!("Pong for {}", timestamp);
                false
            }
        }
    }

    /// The color this client plays, if it is bound to one.
    ///
    /// A claimed seat wins; otherwise in a computer game the human color
    /// belongs to whoever is watching.
    pub fn my_color(&self) -> Option<Color> {
        self.seat.or_else(|| {
            self.snapshot
                .as_ref()
                .filter(|snapshot| snapshot.mode == Some(GameMode::Computer))
                .and_then(|snapshot| snapshot.user_color)
        })
    }

    /// Whether the current turn may be played from this client.
    pub fn is_my_turn(&self) -> bool {
        let Some(snapshot) = self.snapshot.as_ref().filter(|s| s.game_started) else {
            return false;
        };
        let Some(turn) = snapshot.turn else {
            return false;
        };
        match self.my_color() {
            Some(color) => color == turn,
            None => !snapshot.is_bot(turn),
        }
    }

    /// Tokens this client may move right now.
    pub fn movable_tokens(&self) -> Vec<usize> {
        if !self.is_my_turn() {
            return Vec::new();
        }
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        let (Some(turn), Some(roll)) = (snapshot.turn, snapshot.rolled_value) else {
            return Vec::new();
        };
        if !snapshot.can_move {
            return Vec::new();
        }
        snapshot
            .player(turn)
            .map(|player| player.movable_tokens(roll))
            .unwrap_or_default()
    }

    /// What an autoplaying client sends next, if anything.
    pub fn autoplay_action<R: Rng>(&self, rng: &mut R) -> Option<ClientMessage> {
        if !self.is_my_turn() {
            return None;
        }
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.rolled_value.is_none() {
            return Some(ClientMessage::RollDice);
        }
        self.movable_tokens()
            .choose(rng)
            .map(|&token_index| ClientMessage::MoveToken { token_index })
    }

    /// One-line description of the latest snapshot.
    pub fn summary(&self) -> String {
        let room = self.room.as_deref().unwrap_or("-");
        let Some(snapshot) = &self.snapshot else {
            return format!("[{}] waiting for state", room);
        };
        if let Some(winner) = snapshot.winner {
            return format!("[{}] {} won | {}", room, winner, snapshot.log);
        }
        if !snapshot.game_started {
            return format!("[{}] no game running | {}", room, snapshot.log);
        }

        let mut line = format!("[{}]", room);
        if let Some(turn) = snapshot.turn {
            line.push_str(&format!(" turn: {}", turn));
        }
        if let Some(roll) = snapshot.rolled_value {
            line.push_str(&format!(" rolled: {}", roll));
        }
        for color in &snapshot.active_colors {
            if let Some(player) = snapshot.player(*color) {
                let tokens: Vec<String> = player.tokens.iter().map(|t| describe(*t)).collect();
                line.push_str(&format!(" | {} {}", color, tokens.join(",")));
            }
        }
        line.push_str(&format!(" | {}", snapshot.log));

        let movable = self.movable_tokens();
        if !movable.is_empty() {
            line.push_str(&format!(" | move one of {:?}", movable));
        } else if self.is_my_turn() && snapshot.rolled_value.is_none() {
            line.push_str(" | your roll");
        }
        line
    }
}

fn describe(position: TokenPosition) -> String {
    match position {
        TokenPosition::Home => "H".to_string(),
        TokenPosition::Finished => "F".to_string(),
        other => other.to_wire().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::PlayerState;
    use std::collections::BTreeMap;

    fn snapshot(mode: GameMode, user_color: Option<Color>, turn: Color) -> GameSnapshot {
        let active_colors = vec![Color::Red, Color::Yellow];
        let players: BTreeMap<Color, PlayerState> = Color::ALL
            .iter()
            .map(|&color| (color, PlayerState::new(color)))
            .collect();
        GameSnapshot {
            mode: Some(mode),
            num_players: 2,
            active_colors,
            user_color,
            turn: Some(turn),
            rolled_value: None,
            can_move: false,
            players,
            log: "RED's TURN - CLICK DICE TO ROLL!".to_string(),
            game_started: true,
            winner: None,
        }
    }

    #[test]
    fn test_apply_tracks_connection_and_room() {
        let mut game = ClientGameState::new();
        assert!(!game.apply(ServerMessage::Connected { client_id: 4 }));
        assert!(!game.apply(ServerMessage::RoomJoined {
            code: "MAIN".to_string(),
            seat: Some(Color::Blue),
        }));
        assert_eq!(game.client_id, Some(4));
        assert_eq!(game.room.as_deref(), Some("MAIN"));
        assert_eq!(game.my_color(), Some(Color::Blue));

        assert!(!game.apply(ServerMessage::Rejected {
            reason: "roll the dice first".to_string(),
        }));
        assert!(game.last_rejection.is_some());
        assert!(game.apply(ServerMessage::UpdateState(snapshot(
            GameMode::Multiplayer,
            None,
            Color::Red,
        ))));
        assert!(game.last_rejection.is_none());
    }

    #[test]
    fn test_turn_ownership() {
        let mut game = ClientGameState::new();
        assert!(!game.is_my_turn());

        game.snapshot = Some(snapshot(GameMode::Computer, Some(Color::Red), Color::Red));
        assert_eq!(game.my_color(), Some(Color::Red));
        assert!(game.is_my_turn());

        game.snapshot = Some(snapshot(GameMode::Computer, Some(Color::Red), Color::Yellow));
        assert!(!game.is_my_turn());

        // Unseated in multiplayer: every turn can be played from here.
        game.snapshot = Some(snapshot(GameMode::Multiplayer, None, Color::Yellow));
        assert!(game.is_my_turn());

        game.seat = Some(Color::Red);
        assert!(!game.is_my_turn());
    }

    #[test]
    fn test_movable_tokens_follow_roll() {
        let mut game = ClientGameState::new();
        let mut state = snapshot(GameMode::Computer, Some(Color::Red), Color::Red);
        state.players.get_mut(&Color::Red).unwrap().tokens[2] = TokenPosition::Track(10);
        state.rolled_value = Some(3);
        state.can_move = true;
        game.snapshot = Some(state);

        assert_eq!(game.movable_tokens(), vec![2]);

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            game.autoplay_action(&mut rng),
            Some(ClientMessage::MoveToken { token_index: 2 })
        );
    }

    #[test]
    fn test_autoplay_rolls_then_waits() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut game = ClientGameState::new();
        game.snapshot = Some(snapshot(GameMode::Computer, Some(Color::Red), Color::Red));
        assert_eq!(game.autoplay_action(&mut rng), Some(ClientMessage::RollDice));

        if let Some(state) = game.snapshot.as_mut() {
            state.rolled_value = Some(2);
            state.can_move = false;
        }
        assert_eq!(game.autoplay_action(&mut rng), None);

        game.snapshot = Some(snapshot(GameMode::Computer, Some(Color::Red), Color::Yellow));
        assert_eq!(game.autoplay_action(&mut rng), None);
    }

    #[test]
    fn test_summary() {
        let mut game = ClientGameState::new();
        assert_eq!(game.summary(), "[-] waiting for state");

        game.room = Some("MAIN".to_string());
        let mut state = snapshot(GameMode::Computer, Some(Color::Red), Color::Red);
        state.players.get_mut(&Color::Red).unwrap().tokens[0] = TokenPosition::HomeStretch(1);
        game.snapshot = Some(state);

        let summary = game.summary();
        assert!(summary.starts_with("[MAIN] turn: red"));
        assert!(summary.contains("red 53,H,H,H"));
        assert!(summary.contains("yellow H,H,H,H"));
        assert!(summary.ends_with("your roll"));

        if let Some(state) = game.snapshot.as_mut() {
            state.game_started = false;
            state.winner = Some(Color::Red);
            state.log = "RED WINS!".to_string();
        }
        assert_eq!(game.summary(), "[MAIN] red won | RED WINS!");
    }
}
