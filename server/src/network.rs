//! Server network layer: websocket connections, room routing and
//! connection health.
//!
//! Every connection gets a writer task fed by an mpsc queue and, while it
//! watches a room, a forwarder task relaying that room's snapshots into the
//! same queue. The reader side decodes frames and hands intents to the room
//! session; it never touches game state directly.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::{Actor, Intent};
use crate::rooms::{RoomRegistry, DEFAULT_ROOM};
use crate::session::{SessionError, SessionHandle};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::protocol::{decode_binary, decode_json, encode_binary, encode_json};
use shared::{ClientMessage, Color, Encoding, ProtocolError, ServerMessage};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Frames queued for a connection's writer task
#[derive(Debug)]
pub enum Outgoing {
    Message(ServerMessage),
    Close,
}

/// Why a connection could not enter a room
#[derive(Debug, Error)]
enum JoinError {
    #[error("Unknown room {0}")]
    UnknownRoom(String),
    #[error("{seat} is already taken in room {code}")]
    SeatTaken { seat: Color, code: String },
    #[error("{0} is played by the computer")]
    BotSeat(Color),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A room the connection has been recorded in, and the room it left
struct Entered {
    room: SessionHandle,
    previous: Option<String>,
}

/// Shared handles reachable from every connection task
#[derive(Clone)]
pub struct AppState {
    clients: Arc<RwLock<ClientManager>>,
    rooms: Arc<RwLock<RoomRegistry>>,
    connections: Arc<RwLock<HashMap<u32, mpsc::UnboundedSender<Outgoing>>>>,
    config: Arc<ServerConfig>,
}

impl AppState {
    /// Must be called inside a tokio runtime; spawns the default room.
    pub fn new(config: ServerConfig) -> Self {
        let rooms = RoomRegistry::new(config.pacing(), config.seed);
        Self {
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            rooms: Arc::new(RwLock::new(rooms)),
            connections: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Records `client_id` in room `code` holding `seat`.
    ///
    /// The registry stays read-locked until the client is recorded, so
    /// `cleanup_room` cannot close the room in between.
    async fn enter_room(
        &self,
        client_id: u32,
        code: &str,
        seat: Option<Color>,
    ) -> Result<Entered, JoinError> {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(code)
            .ok_or_else(|| JoinError::UnknownRoom(code.to_string()))?;

        if let Some(seat) = seat {
            if room.snapshot().await?.is_bot(seat) {
                return Err(JoinError::BotSeat(seat));
            }
        }

        let mut clients = self.clients.write().await;
        if let Some(seat) = seat {
            let holder = clients.seat_holder(room.id(), seat);
            if holder.is_some_and(|holder| holder != client_id) {
                return Err(JoinError::SeatTaken {
                    seat,
                    code: room.id().to_string(),
                });
            }
        }
        let previous = clients.join_room(client_id, room.id(), seat);
        Ok(Entered { room, previous })
    }

    /// Opens a fresh room and records `client_id` in it.
    async fn open_room(&self, client_id: u32) -> Entered {
        let mut rooms = self.rooms.write().await;
        let room = rooms.create_room();
        let previous = self.clients.write().await.join_room(client_id, room.id(), None);
        Entered { room, previous }
    }

    /// Removes a non-default room once nobody is watching it.
    async fn cleanup_room(&self, code: &str) {
        if code == DEFAULT_ROOM {
            return;
        }
        let mut rooms = self.rooms.write().await;
        if self.clients.read().await.room_population(code) == 0 {
            rooms.remove(code);
        }
    }
}

/// Websocket game server
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            state: AppState::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let checker = tokio::spawn(check_timeouts(self.state.clone()));
        let app = router(self.state);

        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        checker.abort();
        info!("Server stopped");
        result
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// One open websocket: the room it watches and the queue feeding its writer.
struct Connection {
    id: u32,
    outbound: mpsc::UnboundedSender<Outgoing>,
    room: SessionHandle,
    seat: Option<Color>,
    forwarder: JoinHandle<()>,
}

impl Connection {
    fn send(&self, message: ServerMessage) {
        let _ = self.outbound.send(Outgoing::Message(message));
    }

    fn reject(&self, reason: impl Into<String>) {
        self.send(ServerMessage::Rejected {
            reason: reason.into(),
        });
    }
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let client_id = state.clients.write().await.add_client(addr, DEFAULT_ROOM);
    let Some(client_id) = client_id else {
        warn!("Rejecting connection from {}: server full", addr);
        let rejected = ServerMessage::Rejected {
            reason: "Server full".to_string(),
        };
        if let Ok(frame) = encode_frame(&rejected, Encoding::Json) {
            let _ = sink.send(frame).await;
        }
        let _ = sink.send(Message::Close(None)).await;
        return;
    };

    let Some(main) = state.rooms.read().await.default_room() else {
        error!("Default room is missing");
        state.clients.write().await.remove_client(&client_id);
        return;
    };

    let (outbound, queue) = mpsc::unbounded_channel();
    state
        .connections
        .write()
        .await
        .insert(client_id, outbound.clone());
    let mut writer = tokio::spawn(write_frames(client_id, sink, queue, state.clone()));

    let mut connection = Connection {
        id: client_id,
        forwarder: forward_updates(&main, outbound.clone()),
        outbound,
        room: main.clone(),
        seat: None,
    };
    connection.send(ServerMessage::Connected { client_id });
    send_room_view(&connection).await;

    loop {
        tokio::select! {
            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!("Client {} read error: {}", client_id, e);
                        break;
                    }
                    None => break,
                };
                state.clients.write().await.touch(client_id);

                let (message, encoding) = match decode_frame(&frame) {
                    Some(Ok(decoded)) => decoded,
                    Some(Err(e)) => {
                        warn!("Client {} sent an undecodable frame: {}", client_id, e);
                        continue;
                    }
                    None => {
                        if matches!(frame, Message::Close(_)) {
                            break;
                        }
                        continue;
                    }
                };
                state.clients.write().await.set_encoding(client_id, encoding);
                handle_message(&mut connection, message, &state).await;
            }
            _ = &mut writer => break,
        }
    }

    connection.forwarder.abort();
    writer.abort();
    state.connections.write().await.remove(&client_id);
    state.clients.write().await.remove_client(&client_id);
    state.cleanup_room(connection.room.id()).await;
}

async fn handle_message(connection: &mut Connection, message: ClientMessage, state: &AppState) {
    debug!("Client {} sent {:?}", connection.id, message);

    let intent = match message {
        ClientMessage::Ping { timestamp } => {
            connection.send(ServerMessage::Pong { timestamp });
            return;
        }
        ClientMessage::CreateRoom => {
            let entered = state.open_room(connection.id).await;
            switch_room(connection, entered, None, state).await;
            return;
        }
        ClientMessage::JoinRoom { code, color } => {
            match state.enter_room(connection.id, &code, color).await {
                Ok(entered) => switch_room(connection, entered, color, state).await,
                Err(e) => {
                    debug!("Client {} could not join {}: {}", connection.id, code, e);
                    connection.reject(e.to_string());
                }
            }
            return;
        }
        ClientMessage::StartGame {
            mode,
            num_players,
            user_color,
        } => Intent::StartGame {
            mode,
            num_players,
            user_color,
        },
        ClientMessage::RollDice => Intent::RollDice,
        ClientMessage::MoveToken { token_index } => Intent::MoveToken { token_index },
    };

    let actor = Actor::Human {
        seat: connection.seat,
    };
    match connection.room.submit(actor, intent).await {
        Ok(()) => {}
        Err(SessionError::Rejected(rejection)) => connection.reject(rejection.to_string()),
        Err(e @ SessionError::Closed(_)) => {
            warn!("Client {}: {}", connection.id, e);
            connection.reject(e.to_string());
        }
    }
}

/// Points the connection at the room it was recorded in and sends it the
/// room's current state.
async fn switch_room(
    connection: &mut Connection,
    entered: Entered,
    seat: Option<Color>,
    state: &AppState,
) {
    let Entered { room, previous } = entered;

    connection.forwarder.abort();
    connection.forwarder = forward_updates(&room, connection.outbound.clone());
    connection.room = room;
    connection.seat = seat;
    send_room_view(connection).await;

    if let Some(previous) = previous {
        if previous != connection.room.id() {
            state.cleanup_room(&previous).await;
        }
    }
}

async fn send_room_view(connection: &Connection) {
    connection.send(ServerMessage::RoomJoined {
        code: connection.room.id().to_string(),
        seat: connection.seat,
    });
    match connection.room.snapshot().await {
        Ok(snapshot) => connection.send(ServerMessage::UpdateState(snapshot)),
        Err(e) => connection.reject(e.to_string()),
    }
}

/// Relays a room's snapshots into a connection's outbound queue.
fn forward_updates(
    room: &SessionHandle,
    outbound: mpsc::UnboundedSender<Outgoing>,
) -> JoinHandle<()> {
    let mut updates = room.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(snapshot) => {
                    let message = Outgoing::Message(ServerMessage::UpdateState(snapshot));
                    if outbound.send(message).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Connection fell behind by {} snapshots", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn write_frames(
    client_id: u32,
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::UnboundedReceiver<Outgoing>,
    state: AppState,
) {
    let mut ping = tokio::time::interval(state.config.ping_interval());
    ping.tick().await;

    loop {
        let frame = tokio::select! {
            outgoing = queue.recv() => match outgoing {
                Some(Outgoing::Message(message)) => {
                    let encoding = state
                        .clients
                        .read()
                        .await
                        .get(client_id)
                        .map(|client| client.encoding)
                        .unwrap_or_default();
                    match encode_frame(&message, encoding) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Failed to encode message for client {}: {}", client_id, e);
                            continue;
                        }
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        if let Err(e) = sink.send(frame).await {
            debug!("Failed to send to client {}: {}", client_id, e);
            break;
        }
    }
}

/// Closes connections that have gone quiet for longer than the timeout.
async fn check_timeouts(state: AppState) {
    let timeout = state.config.client_timeout();
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;

        let timed_out = state.clients.write().await.check_timeouts(timeout);
        for client in timed_out {
            info!("Client {} timed out", client.id);
            if let Some(outbound) = state.connections.write().await.remove(&client.id) {
                let _ = outbound.send(Outgoing::Close);
            }
            state.cleanup_room(&client.room).await;
        }
    }
}

fn encode_frame(message: &ServerMessage, encoding: Encoding) -> Result<Message, ProtocolError> {
    match encoding {
        Encoding::Json => Ok(Message::Text(encode_json(message)?)),
        Encoding::Bincode => Ok(Message::Binary(encode_binary(message)?)),
    }
}

/// Decodes a data frame. Control frames yield `None`.
fn decode_frame(frame: &Message) -> Option<Result<(ClientMessage, Encoding), ProtocolError>> {
    match frame {
        Message::Text(text) => Some(decode_json(text).map(|message| (message, Encoding::Json))),
        Message::Binary(bytes) => {
            Some(decode_binary(bytes).map(|message| (message, Encoding::Bincode)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use shared::GameMode;

    #[test]
    fn test_encode_frame_follows_encoding() {
        let message = ServerMessage::Pong { timestamp: 5 };

        match encode_frame(&message, Encoding::Json).unwrap() {
            Message::Text(text) => {
                assert_eq!(decode_json::<ServerMessage>(&text).unwrap(), message)
            }
            other => panic!("expected text frame, got {:?}", other),
        }
        match encode_frame(&message, Encoding::Bincode).unwrap() {
            Message::Binary(bytes) => {
                assert_eq!(decode_binary::<ServerMessage>(&bytes).unwrap(), message)
            }
            other => panic!("expected binary frame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame() {
        let text = Message::Text(r#"{"move_token":{"token_index":2}}"#.to_string());
        let (message, encoding) = decode_frame(&text).unwrap().unwrap();
        assert_eq!(message, ClientMessage::MoveToken { token_index: 2 });
        assert_eq!(encoding, Encoding::Json);

        let start = ClientMessage::StartGame {
            mode: GameMode::Computer,
            num_players: 2,
            user_color: Some(Color::Blue),
        };
        let binary = Message::Binary(encode_binary(&start).unwrap());
        let (message, encoding) = decode_frame(&binary).unwrap().unwrap();
        assert_eq!(message, start);
        assert_eq!(encoding, Encoding::Bincode);

        assert!(decode_frame(&Message::Text("not json".to_string()))
            .unwrap()
            .is_err());
        assert!(decode_frame(&Message::Ping(Vec::new())).is_none());
    }

    fn test_state() -> AppState {
        AppState::new(ServerConfig::parse_from(["server", "--seed", "1"]))
    }

    async fn add_client(state: &AppState, port: u16) -> u32 {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        state
            .clients
            .write()
            .await
            .add_client(addr, DEFAULT_ROOM)
            .unwrap()
    }

    async fn client_room(state: &AppState, client_id: u32) -> String {
        state.clients.read().await.get(client_id).unwrap().room.clone()
    }

    #[tokio::test]
    async fn test_join_racing_cleanup_keeps_room_and_client_consistent() {
        let state = test_state();
        let client_id = add_client(&state, 9000).await;

        // Join wins: the room now has a watcher and must survive cleanup.
        let code = state.rooms.write().await.create_room().id().to_string();
        let (joined, ()) = tokio::join!(
            state.enter_room(client_id, &code, None),
            state.cleanup_room(&code)
        );
        let entered = joined.unwrap();
        assert_eq!(entered.room.id(), code);
        assert_eq!(entered.previous.as_deref(), Some(DEFAULT_ROOM));
        assert!(state.rooms.read().await.get(&code).is_some());
        assert_eq!(client_room(&state, client_id).await, code);
        assert!(entered.room.snapshot().await.is_ok());

        // Cleanup wins: the join is refused and the client stays put.
        let abandoned = state.rooms.write().await.create_room().id().to_string();
        let ((), joined) = tokio::join!(
            state.cleanup_room(&abandoned),
            state.enter_room(client_id, &abandoned, None)
        );
        assert!(matches!(joined, Err(JoinError::UnknownRoom(_))));
        assert!(state.rooms.read().await.get(&abandoned).is_none());
        assert_eq!(client_room(&state, client_id).await, code);
    }

    #[tokio::test]
    async fn test_concurrent_joins_and_cleanups_never_strand_a_client() {
        let state = test_state();
        let client_id = add_client(&state, 9000).await;

        for _ in 0..20 {
            let code = state.rooms.write().await.create_room().id().to_string();
            let joining = tokio::spawn({
                let state = state.clone();
                let code = code.clone();
                async move { state.enter_room(client_id, &code, None).await.is_ok() }
            });
            let cleaning = tokio::spawn({
                let state = state.clone();
                let code = code.clone();
                async move { state.cleanup_room(&code).await }
            });
            cleaning.await.unwrap();
            let joined = joining.await.unwrap();

            let registered = state.rooms.read().await.get(&code).is_some();
            let in_room = client_room(&state, client_id).await == code;
            assert_eq!(joined, registered);
            assert_eq!(joined, in_room);
        }
    }

    #[tokio::test]
    async fn test_seat_claims_are_exclusive() {
        let state = test_state();
        let first = add_client(&state, 9000).await;
        let second = add_client(&state, 9001).await;
        let code = state.rooms.write().await.create_room().id().to_string();

        assert!(state.enter_room(first, &code, Some(Color::Red)).await.is_ok());
        let taken = state.enter_room(second, &code, Some(Color::Red)).await;
        assert!(matches!(
            taken,
            Err(JoinError::SeatTaken { seat: Color::Red, .. })
        ));
        assert_eq!(client_room(&state, second).await, DEFAULT_ROOM);

        // Re-claiming your own seat and taking a free one both succeed.
        assert!(state.enter_room(first, &code, Some(Color::Red)).await.is_ok());
        assert!(state.enter_room(second, &code, Some(Color::Blue)).await.is_ok());

        // The same color in another room is independent.
        assert!(state
            .enter_room(second, DEFAULT_ROOM, Some(Color::Red))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_bot_seats_cannot_be_claimed() {
        let state = test_state();
        let client_id = add_client(&state, 9000).await;
        let room = state.rooms.write().await.create_room();
        room.submit(
            Actor::human(),
            Intent::StartGame {
                mode: GameMode::Computer,
                num_players: 2,
                user_color: Some(Color::Red),
            },
        )
        .await
        .unwrap();

        let refused = state
            .enter_room(client_id, room.id(), Some(Color::Yellow))
            .await;
        assert!(matches!(refused, Err(JoinError::BotSeat(Color::Yellow))));
        assert_eq!(client_room(&state, client_id).await, DEFAULT_ROOM);

        let entered = state
            .enter_room(client_id, room.id(), Some(Color::Red))
            .await
            .unwrap();
        assert_eq!(entered.room.id(), room.id());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_watched_and_default_rooms() {
        let state = test_state();
        let (watched, empty) = {
            let mut rooms = state.rooms.write().await;
            (rooms.create_room(), rooms.create_room())
        };

        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let client_id = state
            .clients
            .write()
            .await
            .add_client(addr, DEFAULT_ROOM)
            .unwrap();
        state
            .clients
            .write()
            .await
            .join_room(client_id, watched.id(), None);

        state.cleanup_room(DEFAULT_ROOM).await;
        state.cleanup_room(watched.id()).await;
        state.cleanup_room(empty.id()).await;

        let rooms = state.rooms.read().await;
        assert!(rooms.default_room().is_some());
        assert!(rooms.get(watched.id()).is_some());
        assert!(rooms.get(empty.id()).is_none());
    }
}
