// Known clients, keyed by username with a secondary index by address.
// Presence is tracked with last_seen so idle clients can be evicted.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub username: String,
    pub address: SocketAddr,
    pub last_acknowledged_frame: u64,
    pub last_seen: Instant,
}

impl ClientRecord {
    /// How many frames the client's acknowledgements trail `current_frame`.
    pub fn lag(&self, current_frame: u64) -> u64 {
        current_frame.saturating_sub(self.last_acknowledged_frame)
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    clients_by_name: HashMap<String, ClientRecord>,
    clients_by_addr: HashMap<SocketAddr, String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients_by_name.is_empty()
    }

    pub fn get(&self, username: &str) -> Option<&ClientRecord> {
        self.clients_by_name.get(username)
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&ClientRecord> {
        let username = self.clients_by_addr.get(addr)?;
        self.clients_by_name.get(username)
    }

    pub fn addresses(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.clients_by_name.values().map(|client| client.address)
    }

    /// Records (or overwrites) `username` at `address`, acknowledged up to `frame`.
    /// A different username previously bound to `address` is dropped.
    /// Returns the records that were replaced.
    pub fn join(
        &mut self,
        username: &str,
        address: SocketAddr,
        frame: u64,
        now: Instant,
    ) -> Vec<ClientRecord> {
        let mut replaced = Vec::new();

        if let Some(previous) = self.clients_by_name.remove(username) {
            self.clients_by_addr.remove(&previous.address);
            replaced.push(previous);
        }
        if let Some(other) = self.clients_by_addr.remove(&address) {
            if let Some(previous) = self.clients_by_name.remove(&other) {
                replaced.push(previous);
            }
        }

        self.clients_by_addr.insert(address, username.to_string());
        self.clients_by_name.insert(
            username.to_string(),
            ClientRecord {
                username: username.to_string(),
                address,
                last_acknowledged_frame: frame,
                last_seen: now,
            },
        );
        replaced
    }

    /// Refreshes presence for the client at `addr`. Returns false for unknown peers.
    pub fn touch(&mut self, addr: &SocketAddr, now: Instant) -> bool {
        match self.record_mut(addr) {
            Some(client) => {
                client.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Records a frame acknowledgement. Acks never move a client backwards.
    pub fn acknowledge(&mut self, addr: &SocketAddr, frame: u64, now: Instant) -> bool {
        match self.record_mut(addr) {
            Some(client) => {
                client.last_seen = now;
                client.last_acknowledged_frame = client.last_acknowledged_frame.max(frame);
                true
            }
            None => false,
        }
    }

    /// Removes every client not seen within `timeout` of `now`.
    pub fn evict_idle(&mut self, now: Instant, timeout: Duration) -> Vec<ClientRecord> {
        let expired: Vec<String> = self
            .clients_by_name
            .values()
            .filter(|client| now.saturating_duration_since(client.last_seen) > timeout)
            .map(|client| client.username.clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for username in expired {
            if let Some(client) = self.clients_by_name.remove(&username) {
                self.clients_by_addr.remove(&client.address);
                evicted.push(client);
            }
        }
        evicted
    }

    fn record_mut(&mut self, addr: &SocketAddr) -> Option<&mut ClientRecord> {
        let username = self.clients_by_addr.get(addr)?;
        self.clients_by_name.get_mut(username)
    }
}
