//! Authoritative rules engine for one Ludo session.
//!
//! The engine is synchronous and single-writer. Every operation either
//! rejects the intent without touching state, or mutates state and returns
//! the effects the caller must carry out: snapshots to broadcast and
//! continuations to run after a delay.

use crate::bot;
use crate::config::Pacing;
use crate::dice::RandomSource;
use log::{debug, info};
use shared::{
    is_safe_cell, Color, GameMode, GameSnapshot, PlayerState, TokenPosition, EXIT_ROLL,
};
use std::time::Duration;
use thiserror::Error;

/// Something a client (or a bot) asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    StartGame {
        mode: GameMode,
        num_players: u8,
        user_color: Option<Color>,
    },
    RollDice,
    MoveToken {
        token_index: usize,
    },
}

/// Who submitted an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A connected player, optionally bound to one color.
    Human { seat: Option<Color> },
    Bot,
}

impl Actor {
    pub fn human() -> Self {
        Actor::Human { seat: None }
    }

    pub fn seated(color: Color) -> Self {
        Actor::Human { seat: Some(color) }
    }
}

/// Why an intent was ignored. None of these mutate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no game in progress")]
    NotStarted,
    #[error("dice already rolled this turn")]
    AlreadyRolled,
    #[error("turn is passing to the next player")]
    TurnEnding,
    #[error("roll the dice first")]
    CannotMove,
    #[error("it is {0}'s turn")]
    NotYourTurn(Color),
    #[error("bots only act on their own turn")]
    NotBotTurn,
    #[error("token index {0} is out of range")]
    InvalidToken(usize),
    #[error("a 6 is needed to leave home")]
    NeedSix,
    #[error("token {0} would move past the finish")]
    Overshoot(usize),
    #[error("token {0} has already finished")]
    TokenFinished(usize),
    #[error("{0} players is not supported")]
    InvalidPlayerCount(u8),
    #[error("computer mode needs a user color")]
    MissingUserColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationKind {
    /// Hand the turn to the next color.
    AdvanceTurn,
    BotRoll,
    BotMove,
}

/// Deferred work, valid only while the engine is still at `serial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    pub kind: ContinuationKind,
    pub color: Color,
    pub serial: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Broadcast(GameSnapshot),
    Schedule {
        after: Duration,
        continuation: Continuation,
    },
}

pub struct GameState {
    mode: Option<GameMode>,
    num_players: u8,
    active_colors: Vec<Color>,
    turn_order: Vec<Color>,
    user_color: Option<Color>,
    turn: Option<Color>,
    rolled_value: Option<u8>,
    can_move: bool,
    game_started: bool,
    // A resolved move is waiting for its paced hand-off.
    turn_ending: bool,
    winner: Option<Color>,
    players: [PlayerState; 4],
    log: String,
    serial: u64,
    pacing: Pacing,
    random: Box<dyn RandomSource>,
}

impl GameState {
    pub fn new(pacing: Pacing, random: Box<dyn RandomSource>) -> Self {
        Self {
            mode: None,
            num_players: 4,
            active_colors: Vec::new(),
            turn_order: Vec::new(),
            user_color: None,
            turn: None,
            rolled_value: None,
            can_move: false,
            game_started: false,
            turn_ending: false,
            winner: None,
            players: Color::ALL.map(PlayerState::new),
            log: "Click VS COMPUTER or MULTIPLAYER to start!".to_string(),
            serial: 0,
            pacing,
            random,
        }
    }

    pub fn apply(&mut self, actor: Actor, intent: Intent) -> Result<Vec<Effect>, Rejection> {
        match intent {
            Intent::StartGame {
                mode,
                num_players,
                user_color,
            } => self.start_game(mode, num_players, user_color),
            Intent::RollDice => self.roll_dice(actor),
            Intent::MoveToken { token_index } => self.move_token(actor, token_index),
        }
    }

    pub fn start_game(
        &mut self,
        mode: GameMode,
        num_players: u8,
        user_color: Option<Color>,
    ) -> Result<Vec<Effect>, Rejection> {
        let active_colors = match (num_players, mode) {
            (4, _) => Color::ALL.to_vec(),
            (2, GameMode::Computer) => {
                let user = user_color.ok_or(Rejection::MissingUserColor)?;
                vec![user, user.opposite()]
            }
            (2, GameMode::Multiplayer) => vec![Color::Red, Color::Yellow],
            (n, _) => return Err(Rejection::InvalidPlayerCount(n)),
        };
        if mode == GameMode::Computer && user_color.is_none() {
            return Err(Rejection::MissingUserColor);
        }

        self.serial += 1;
        self.mode = Some(mode);
        self.num_players = num_players;
        self.user_color = match mode {
            GameMode::Computer => user_color,
            GameMode::Multiplayer => None,
        };
        for player in self.players.iter_mut() {
            player.reset();
        }
        self.turn_order = active_colors.clone();
        self.active_colors = active_colors;
        let first = self.turn_order[0];
        self.turn = Some(first);
        self.rolled_value = None;
        self.can_move = false;
        self.turn_ending = false;
        self.winner = None;
        self.game_started = true;
        self.log = format!("{}'s TURN - CLICK DICE TO ROLL!", shout(first));

        info!(
            "Game started: mode={} players={} colors={:?} first={}",
            mode, num_players, self.active_colors, first
        );

        let mut effects = vec![self.broadcast()];
        if self.is_bot(first) {
            effects.push(self.schedule(self.pacing.bot_roll, ContinuationKind::BotRoll, first));
        }
        Ok(effects)
    }

    pub fn roll_dice(&mut self, actor: Actor) -> Result<Vec<Effect>, Rejection> {
        let color = self.current_turn()?;
        if self.rolled_value.is_some() {
            return Err(Rejection::AlreadyRolled);
        }
        if self.turn_ending {
            return Err(Rejection::TurnEnding);
        }
        self.check_actor(actor, color)?;

        let roll = self.random.roll_die();
        Ok(self.apply_roll(color, roll))
    }

    fn apply_roll(&mut self, color: Color, roll: u8) -> Vec<Effect> {
        self.serial += 1;
        self.rolled_value = Some(roll);
        self.log = format!("{} ROLLED {}!", shout(color), roll);

        let tokens = self.players[color.index()].tokens;
        if !self.players[color.index()].has_legal_move(roll) {
            debug!("{} rolled {} with no legal move: {:?}", color, roll, tokens);
            self.can_move = false;
            self.log.push_str(" NO VALID MOVES!");
            return vec![
                self.broadcast(),
                self.schedule(self.pacing.no_move, ContinuationKind::AdvanceTurn, color),
            ];
        }

        debug!("{} rolled {}: {:?}", color, roll, tokens);
        self.can_move = true;
        self.log.push_str(" CLICK A TOKEN TO MOVE!");
        let mut effects = vec![self.broadcast()];
        if self.is_bot(color) {
            effects.push(self.schedule(self.pacing.bot_move, ContinuationKind::BotMove, color));
        }
        effects
    }

    pub fn move_token(&mut self, actor: Actor, token_index: usize) -> Result<Vec<Effect>, Rejection> {
        let color = self.current_turn()?;
        let roll = match self.rolled_value {
            Some(roll) if self.can_move => roll,
            _ => return Err(Rejection::CannotMove),
        };
        self.check_actor(actor, color)?;

        let from = *self.players[color.index()]
            .tokens
            .get(token_index)
            .ok_or(Rejection::InvalidToken(token_index))?;
        let to = match from.advance(roll) {
            Some(to) => to,
            None if from.is_home() => return Err(Rejection::NeedSix),
            None if from.is_finished() => return Err(Rejection::TokenFinished(token_index)),
            None => return Err(Rejection::Overshoot(token_index)),
        };

        self.serial += 1;
        self.players[color.index()].tokens[token_index] = to;
        self.log = if from.is_home() {
            format!("{} BROUGHT TOKEN OUT!", shout(color))
        } else {
            format!("{} MOVED!", shout(color))
        };
        debug!("{} token {}: {:?} -> {:?}", color, token_index, from, to);

        let captured = self.capture_at(color, to);
        if let Some(victim) = captured.last() {
            info!("{} captured {} token(s) of {:?}", color, captured.len(), captured);
            self.log = format!("{} CAPTURED {}!", shout(color), shout(*victim));
        }

        if self.players[color.index()].all_finished() {
            self.game_started = false;
            self.winner = Some(color);
            self.rolled_value = None;
            self.can_move = false;
            self.turn_ending = false;
            self.log = format!("{} WINS!", shout(color));
            info!("{} won the game", color);
            return Ok(vec![self.broadcast()]);
        }

        self.rolled_value = None;
        self.can_move = false;
        let mut effects = vec![self.broadcast()];

        if roll == EXIT_ROLL || !captured.is_empty() {
            self.log = format!("{} GETS EXTRA TURN!", shout(color));
            effects.push(self.broadcast());
            if self.is_bot(color) {
                effects.push(self.schedule(
                    self.pacing.extra_turn + self.pacing.bot_roll,
                    ContinuationKind::BotRoll,
                    color,
                ));
            }
        } else {
            self.turn_ending = true;
            effects.push(self.schedule(
                self.pacing.move_pacing,
                ContinuationKind::AdvanceTurn,
                color,
            ));
        }
        Ok(effects)
    }

    /// Sends every opposing token on the mover's landing cell back home.
    /// Returns the owner of each captured token.
    fn capture_at(&mut self, mover: Color, landed: TokenPosition) -> Vec<Color> {
        let Some(cell) = landed.absolute_cell(mover) else {
            return Vec::new();
        };
        if is_safe_cell(cell) {
            return Vec::new();
        }

        let mut captured = Vec::new();
        for &opponent in &self.active_colors {
            if opponent == mover {
                continue;
            }
            for token in self.players[opponent.index()].tokens.iter_mut() {
                if token.absolute_cell(opponent) == Some(cell) {
                    *token = TokenPosition::Home;
                    captured.push(opponent);
                }
            }
        }
        captured
    }

    fn next_turn(&mut self) -> Vec<Effect> {
        let Some(current) = self.turn else {
            return Vec::new();
        };
        if self.turn_order.is_empty() {
            return Vec::new();
        }
        let index = self
            .turn_order
            .iter()
            .position(|&color| color == current)
            .unwrap_or(0);
        let next = self.turn_order[(index + 1) % self.turn_order.len()];

        self.serial += 1;
        self.turn = Some(next);
        self.rolled_value = None;
        self.can_move = false;
        self.turn_ending = false;
        self.log = format!("{}'s TURN - CLICK DICE TO ROLL!", shout(next));
        debug!("Next turn: {}", next);

        let mut effects = vec![self.broadcast()];
        if self.is_bot(next) {
            effects.push(self.schedule(
                self.pacing.turn_pacing + self.pacing.bot_roll,
                ContinuationKind::BotRoll,
                next,
            ));
        }
        effects
    }

    /// Runs a scheduled continuation if the session is still where it was
    /// when the continuation was scheduled. Stale continuations do nothing.
    pub fn resume(&mut self, continuation: Continuation) -> Vec<Effect> {
        if continuation.serial != self.serial
            || !self.game_started
            || self.turn != Some(continuation.color)
        {
            debug!("Dropping stale continuation {:?}", continuation);
            return Vec::new();
        }

        match continuation.kind {
            ContinuationKind::AdvanceTurn => {
                let waiting = self.turn_ending || (self.rolled_value.is_some() && !self.can_move);
                if !waiting {
                    return Vec::new();
                }
                self.next_turn()
            }
            ContinuationKind::BotRoll => self.roll_dice(Actor::Bot).unwrap_or_else(|rejection| {
                debug!("Bot roll skipped: {}", rejection);
                Vec::new()
            }),
            ContinuationKind::BotMove => {
                let color = continuation.color;
                let Some(roll) = self.rolled_value.filter(|_| self.can_move) else {
                    return Vec::new();
                };
                if !self.is_bot(color) {
                    return Vec::new();
                }
                let choice =
                    bot::choose_token(&self.players[color.index()], roll, self.random.as_mut());
                match choice {
                    Some(token_index) => {
                        debug!("Bot {} chose token {} for roll {}", color, token_index, roll);
                        self.move_token(Actor::Bot, token_index)
                            .unwrap_or_else(|rejection| {
                                debug!("Bot move skipped: {}", rejection);
                                Vec::new()
                            })
                    }
                    None => Vec::new(),
                }
            }
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            mode: self.mode,
            num_players: self.num_players,
            active_colors: self.active_colors.clone(),
            user_color: self.user_color,
            turn: self.turn,
            rolled_value: self.rolled_value,
            can_move: self.can_move,
            players: Color::ALL
                .iter()
                .map(|&color| (color, self.players[color.index()]))
                .collect(),
            log: self.log.clone(),
            game_started: self.game_started,
            winner: self.winner,
        }
    }

    pub fn turn(&self) -> Option<Color> {
        self.turn
    }

    pub fn rolled_value(&self) -> Option<u8> {
        self.rolled_value
    }

    pub fn can_move(&self) -> bool {
        self.can_move
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn winner(&self) -> Option<Color> {
        self.winner
    }

    pub fn active_colors(&self) -> &[Color] {
        &self.active_colors
    }

    pub fn player(&self, color: Color) -> &PlayerState {
        &self.players[color.index()]
    }

    /// Whether `color` is played by the computer.
    pub fn is_bot(&self, color: Color) -> bool {
        self.mode == Some(GameMode::Computer) && self.user_color != Some(color)
    }

    fn current_turn(&self) -> Result<Color, Rejection> {
        match self.turn {
            Some(color) if self.game_started => Ok(color),
            _ => Err(Rejection::NotStarted),
        }
    }

    fn check_actor(&self, actor: Actor, turn: Color) -> Result<(), Rejection> {
        match actor {
            Actor::Bot if self.is_bot(turn) => Ok(()),
            Actor::Bot => Err(Rejection::NotBotTurn),
            Actor::Human { .. } if self.is_bot(turn) => Err(Rejection::NotYourTurn(turn)),
            Actor::Human { seat: Some(seat) } if seat != turn => Err(Rejection::NotYourTurn(turn)),
            Actor::Human { .. } => Ok(()),
        }
    }

    fn broadcast(&self) -> Effect {
        Effect::Broadcast(self.snapshot())
    }

    fn schedule(&self, after: Duration, kind: ContinuationKind, color: Color) -> Effect {
        Effect::Schedule {
            after,
            continuation: Continuation {
                kind,
                color,
                serial: self.serial,
            },
        }
    }
}

fn shout(color: Color) -> String {
    color.as_str().to_uppercase()
}
