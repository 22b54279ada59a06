use crate::game::ClientGameState;
use crate::input::{parse_line, Command, InputError, HELP};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::protocol::{decode_binary, decode_json, encode_binary, encode_json};
use shared::{ClientMessage, Color, Encoding, ProtocolError, ServerMessage, DEFAULT_ROOM};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connection settings taken from the command line
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server: String,
    pub room: Option<String>,
    pub color: Option<Color>,
    pub autoplay: bool,
    pub encoding: Encoding,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server: "ws://127.0.0.1:8080/ws".to_string(),
            room: None,
            color: None,
            autoplay: false,
            encoding: Encoding::Json,
        }
    }
}

pub struct Client {
    socket: Socket,
    options: ClientOptions,
    game: ClientGameState,
    rng: StdRng,
}

impl Client {
    /// Opens the websocket and, when asked for, joins a room or claims a seat.
    pub async fn connect(options: ClientOptions) -> Result<Self, ClientError> {
        info!("Connecting to {}...", options.server);
        let (socket, _) = connect_async(options.server.as_str()).await?;

        let mut client = Client {
            socket,
            options,
            game: ClientGameState::new(),
            rng: StdRng::from_entropy(),
        };

        if client.options.room.is_some() || client.options.color.is_some() {
            let join = ClientMessage::JoinRoom {
                code: client
                    .options
                    .room
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ROOM.to_string()),
                color: client.options.color,
            };
            client.send(&join).await?;
        }

        Ok(client)
    }

    pub fn game(&self) -> &ClientGameState {
        &self.game
    }

    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        debug!("Sending {:?}", message);
        let frame = encode_frame(message, self.options.encoding)?;
        self.socket.send(frame).await?;
        Ok(())
    }

    /// Waits for the next server message and folds it into the local view.
    ///
    /// Control frames are skipped. Returns `None` once the server closes.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        while let Some(frame) = self.socket.next().await {
            let frame = frame?;
            if let Message::Close(_) = frame {
                break;
            }
            let Some(decoded) = decode_frame(&frame) else {
                continue;
            };
            let message = decoded?;
            self.game.apply(message.clone());
            return Ok(Some(message));
        }
        Ok(None)
    }

    /// Interactive loop: prints every snapshot and sends typed commands.
    pub async fn run(mut self) -> Result<(), ClientError> {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                message = self.next_message() => {
                    let Some(message) = message? else {
                        info!("Server closed the connection");
                        break;
                    };
                    self.print(&message);
                    if self.options.autoplay && matches!(message, ServerMessage::UpdateState(_)) {
                        if let Some(action) = self.game.autoplay_action(&mut self.rng) {
                            self.send(&action).await?;
                        }
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    match parse_line(&line) {
                        Ok(Command::Send(message)) => self.send(&message).await?,
                        Ok(Command::Help) => println!("{}", HELP),
                        Ok(Command::Quit) => break,
                        Err(InputError::Empty) => {}
                        Err(e) => println!("{}", e),
                    }
                }
            }
        }

        if let Err(e) = self.socket.close(None).await {
            warn!("Failed to close connection cleanly: {}", e);
        }
        Ok(())
    }

    fn print(&self, message: &ServerMessage) {
        match message {
            ServerMessage::UpdateState(_) => println!("{}", self.game.summary()),
            ServerMessage::RoomJoined { code, seat } => match seat {
                Some(seat) => println!("joined room {} as {}", code, seat),
                None => println!("joined room {}", code),
            },
            ServerMessage::Rejected { reason } => {
                // Autoplay keeps hitting pacing refusals.
                if !self.options.autoplay {
                    println!("rejected: {}", reason);
                }
            }
            ServerMessage::Pong { timestamp } => {
                let now = crate::input::timestamp_ms();
                println!("pong: {} ms", now.saturating_sub(*timestamp));
            }
            ServerMessage::Connected { client_id } => println!("connected as client {}", client_id),
        }
    }
}

pub fn encode_frame(message: &ClientMessage, encoding: Encoding) -> Result<Message, ProtocolError> {
    match encoding {
        Encoding::Json => Ok(Message::Text(encode_json(message)?)),
        Encoding::Bincode => Ok(Message::Binary(encode_binary(message)?)),
    }
}

/// Decodes a data frame. Control frames yield `None`.
pub fn decode_frame(frame: &Message) -> Option<Result<ServerMessage, ProtocolError>> {
    match frame {
        Message::Text(text) => Some(decode_json(text)),
        Message::Binary(bytes) => Some(decode_binary(bytes)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_follow_encoding() {
        let message = ClientMessage::JoinRoom {
            code: "MAIN".to_string(),
            color: Some(Color::Red),
        };

        let text = encode_frame(&message, Encoding::Json).unwrap();
        assert!(matches!(&text, Message::Text(json) if json.contains("join_room")));

        let binary = encode_frame(&message, Encoding::Bincode).unwrap();
        assert!(matches!(binary, Message::Binary(_)));
    }

    #[test]
    fn test_decode_server_frames() {
        let text = Message::Text(r#"{"connected":{"client_id":3}}"#.to_string());
        assert_eq!(
            decode_frame(&text).unwrap().unwrap(),
            ServerMessage::Connected { client_id: 3 }
        );

        let pong = ServerMessage::Pong { timestamp: 11 };
        let binary = Message::Binary(encode_binary(&pong).unwrap());
        assert_eq!(decode_frame(&binary).unwrap().unwrap(), pong);

        assert!(decode_frame(&Message::Ping(Vec::new())).is_none());
        assert!(decode_frame(&Message::Text("{}".to_string()))
            .unwrap()
            .is_err());
    }

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.server, "ws://127.0.0.1:8080/ws");
        assert_eq!(options.encoding, Encoding::Json);
        assert!(!options.autoplay);
    }
}
