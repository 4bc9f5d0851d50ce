//! Observer connection bookkeeping for the authority server
//!
//! This module tracks which observers are attached to the session:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Address lookup for routing incoming datagrams to a client id
//! - Capacity enforcement
//!
//! Game state never lives here. The manager only answers "who is this
//! datagram from" and "where do I send this packet".

use log::info;
use shared::ClientId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which an observer is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected observer
#[derive(Debug)]
pub struct Client {
    /// Identity assigned by the authority, also the owner id of its entities
    pub id: ClientId,
    /// Network address for sending packets back
    pub addr: SocketAddr,
    /// Last time any packet arrived from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from the client.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has arrived from this client within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Roster of connected observers
///
/// Client ids start at 1 and are never reused within one server run, so a
/// late datagram from a departed client can never be mistaken for a newcomer
/// that happens to get the same id.
pub struct ClientManager {
    clients: HashMap<ClientId, Client>,
    next_client_id: ClientId,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns the assigned id, or None when the server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|c| c.addr)
    }

    /// Refreshes the activity timestamp. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: ClientId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Removes every client silent for longer than [`CLIENT_TIMEOUT`] and
    /// returns their ids so the session can drop their entities.
    pub fn check_timeouts(&mut self) -> Vec<ClientId> {
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Every client id with its address, for broadcasting.
    pub fn get_client_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
