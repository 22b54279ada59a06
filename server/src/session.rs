//! Per-session actor.
//!
//! Each session runs as one tokio task that owns its `GameState`. Intents
//! and scheduled continuations arrive through a single mailbox and are
//! applied one at a time, so the engine never sees concurrent writers.
//! Delays are timer tasks that post back into the mailbox; nothing waits
//! while holding the state.

use crate::config::Pacing;
use crate::dice::RandomSource;
use crate::game::{Actor, Continuation, Effect, GameState, Intent, Rejection};
use log::{debug, info};
use shared::GameSnapshot;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Snapshots buffered per subscriber before slow readers start lagging.
const UPDATE_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("session {0} has shut down")]
    Closed(String),
}

enum SessionCommand {
    Intent {
        actor: Actor,
        intent: Intent,
        reply: oneshot::Sender<Result<(), Rejection>>,
    },
    Resume(Continuation),
    Snapshot(oneshot::Sender<GameSnapshot>),
    Shutdown,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    updates: broadcast::Sender<GameSnapshot>,
}

impl SessionHandle {
    /// Starts a new session task. Must be called inside a tokio runtime.
    pub fn spawn(id: impl Into<String>, pacing: Pacing, random: Box<dyn RandomSource>) -> Self {
        let id = id.into();
        let (commands, mailbox) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);

        let game = GameState::new(pacing, random);
        tokio::spawn(run_session(
            id.clone(),
            game,
            mailbox,
            commands.downgrade(),
            updates.clone(),
        ));

        Self {
            id,
            commands,
            updates,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Applies an intent and waits for the engine's verdict.
    pub async fn submit(&self, actor: Actor, intent: Intent) -> Result<(), SessionError> {
        let (reply, verdict) = oneshot::channel();
        self.commands
            .send(SessionCommand::Intent {
                actor,
                intent,
                reply,
            })
            .map_err(|_| self.closed())?;
        verdict.await.map_err(|_| self.closed())??;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<GameSnapshot, SessionError> {
        let (reply, snapshot) = oneshot::channel();
        self.commands
            .send(SessionCommand::Snapshot(reply))
            .map_err(|_| self.closed())?;
        snapshot.await.map_err(|_| self.closed())
    }

    /// Receives every snapshot emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GameSnapshot> {
        self.updates.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }

    fn closed(&self) -> SessionError {
        SessionError::Closed(self.id.clone())
    }
}

async fn run_session(
    id: String,
    mut game: GameState,
    mut mailbox: mpsc::UnboundedReceiver<SessionCommand>,
    loopback: mpsc::WeakUnboundedSender<SessionCommand>,
    updates: broadcast::Sender<GameSnapshot>,
) {
    info!("Session {} started", id);

    while let Some(command) = mailbox.recv().await {
        match command {
            SessionCommand::Intent {
                actor,
                intent,
                reply,
            } => {
                let verdict = match game.apply(actor, intent) {
                    Ok(effects) => {
                        carry_out(effects, &loopback, &updates);
                        Ok(())
                    }
                    Err(rejection) => {
                        debug!("Session {}: rejected {:?} from {:?}: {}", id, intent, actor, rejection);
                        Err(rejection)
                    }
                };
                let _ = reply.send(verdict);
            }
            SessionCommand::Resume(continuation) => {
                let effects = game.resume(continuation);
                carry_out(effects, &loopback, &updates);
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(game.snapshot());
            }
            SessionCommand::Shutdown => break,
        }
    }

    mailbox.close();
    info!("Session {} stopped", id);
}

fn carry_out(
    effects: Vec<Effect>,
    loopback: &mpsc::WeakUnboundedSender<SessionCommand>,
    updates: &broadcast::Sender<GameSnapshot>,
) {
    for effect in effects {
        match effect {
            Effect::Broadcast(snapshot) => {
                // No subscribers is fine; the state is still authoritative.
                let _ = updates.send(snapshot);
            }
            Effect::Schedule {
                after,
                continuation,
            } => {
                let Some(mailbox) = loopback.upgrade() else {
                    continue;
                };
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = mailbox.send(SessionCommand::Resume(continuation));
                });
            }
        }
    }
}
