//! Connection bookkeeping for the websocket server
//!
//! This module tracks every open connection on the server side, including:
//! - Client id assignment and capacity limits
//! - The room each connection is subscribed to and the seat it holds
//! - The frame encoding replies should use
//! - Activity tracking for idle-connection cleanup
//!
//! The client manager never touches game state; it only answers who is
//! connected and where their updates should go.

use log::info;
use shared::{Color, Encoding};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client
///
/// Each client maintains:
/// - Connection metadata (ID, address, last activity)
/// - The room it currently watches and an optional seat in that room
/// - The encoding of the last frame it sent
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Remote address of the websocket connection
    pub addr: SocketAddr,
    /// Last time we received any frame from this client
    pub last_seen: Instant,
    /// Code of the room this client is subscribed to
    pub room: String,
    /// Color this client plays, if it claimed one
    pub seat: Option<Color>,
    /// Encoding used for frames sent to this client
    pub encoding: Encoding,
}

impl Client {
    /// Creates a new client placed in `room` with no seat
    pub fn new(id: u32, addr: SocketAddr, room: &str) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            room: room.to_string(),
            seat: None,
            encoding: Encoding::default(),
        }
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no frames have been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// The ClientManager provides centralized control over client connections
/// and enforces server capacity limits. Room membership lives here so that
/// the network layer can tell when a room has been left empty.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection in `room`
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, room: &str) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, room));

        Some(client_id)
    }

    /// Removes a client from the server
    ///
    /// Returns the removed client so the caller can clean up its room,
    /// or None if it was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Records activity from a client. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: u32) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remembers which encoding the client last spoke
    pub fn set_encoding(&mut self, client_id: u32, encoding: Encoding) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.encoding = encoding;
        }
    }

    /// Moves a client into `room` with the given seat
    ///
    /// Returns the code of the room it left, or None for unknown ids.
    pub fn join_room(&mut self, client_id: u32, room: &str, seat: Option<Color>) -> Option<String> {
        let client = self.clients.get_mut(&client_id)?;
        let previous = std::mem::replace(&mut client.room, room.to_string());
        client.seat = seat;
        info!(
            "Client {} moved from room {} to {} (seat: {:?})",
            client_id, previous, room, seat
        );
        Some(previous)
    }

    /// Number of clients currently subscribed to `room`
    pub fn room_population(&self, room: &str) -> usize {
        self.clients
            .values()
            .filter(|client| client.room == room)
            .count()
    }

    /// The client holding `seat` in `room`, if any
    pub fn seat_holder(&self, room: &str, seat: Color) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.room == room && client.seat == Some(seat))
            .map(|client| client.id)
    }

    /// Checks for and removes timed-out clients
    ///
    /// Disconnects clients that haven't sent anything within `timeout`.
    /// Returns the removed clients so their connections and rooms can be
    /// cleaned up by the network layer.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Client> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::DEFAULT_ROOM;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr, DEFAULT_ROOM);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.room, DEFAULT_ROOM);
        assert_eq!(client.seat, None);
        assert_eq!(client.encoding, Encoding::Json);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr(), DEFAULT_ROOM);

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr(), DEFAULT_ROOM).unwrap();
        let client_id2 = manager.add_client(test_addr2(), DEFAULT_ROOM).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.room_population(DEFAULT_ROOM), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        let client_id1 = manager.add_client(test_addr(), DEFAULT_ROOM);
        assert!(client_id1.is_some());
        assert_eq!(manager.len(), 1);

        let client_id2 = manager.add_client(test_addr2(), DEFAULT_ROOM);
        assert!(client_id2.is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);

        let client_id = manager.add_client(test_addr(), DEFAULT_ROOM).unwrap();
        let removed = manager.remove_client(&client_id).unwrap();
        assert_eq!(removed.id, client_id);
        assert!(manager.is_empty());

        assert!(manager.remove_client(&999).is_none());
    }

    #[test]
    fn test_join_room_moves_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr(), DEFAULT_ROOM).unwrap();

        let previous = manager.join_room(client_id, "ABC234", Some(Color::Green));
        assert_eq!(previous.as_deref(), Some(DEFAULT_ROOM));

        let client = manager.get(client_id).unwrap();
        assert_eq!(client.room, "ABC234");
        assert_eq!(client.seat, Some(Color::Green));
        assert_eq!(manager.room_population(DEFAULT_ROOM), 0);
        assert_eq!(manager.room_population("ABC234"), 1);

        assert!(manager.join_room(999, "ABC234", None).is_none());
    }

    #[test]
    fn test_seat_holder_is_per_room() {
        let mut manager = ClientManager::new(3);
        let red = manager.add_client(test_addr(), DEFAULT_ROOM).unwrap();
        let other = manager.add_client(test_addr2(), DEFAULT_ROOM).unwrap();

        manager.join_room(red, "ABC234", Some(Color::Red));
        manager.join_room(other, "XYZ789", Some(Color::Red));

        assert_eq!(manager.seat_holder("ABC234", Color::Red), Some(red));
        assert_eq!(manager.seat_holder("XYZ789", Color::Red), Some(other));
        assert_eq!(manager.seat_holder("ABC234", Color::Blue), None);

        manager.remove_client(&red);
        assert_eq!(manager.seat_holder("ABC234", Color::Red), None);
    }

    #[test]
    fn test_touch_and_encoding() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr(), DEFAULT_ROOM).unwrap();

        assert!(manager.touch(client_id));
        assert!(!manager.touch(42));

        manager.set_encoding(client_id, Encoding::Bincode);
        assert_eq!(manager.get(client_id).unwrap().encoding, Encoding::Bincode);
    }

    #[test]
    fn test_check_timeouts_removes_idle_clients() {
        let mut manager = ClientManager::new(3);
        let idle = manager.add_client(test_addr(), DEFAULT_ROOM).unwrap();
        let active = manager.add_client(test_addr2(), DEFAULT_ROOM).unwrap();

        manager.clients.get_mut(&idle).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        let removed = manager.check_timeouts(Duration::from_secs(5));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, idle);
        assert!(manager.get(active).is_some());
        assert_eq!(manager.len(), 1);
    }
}
