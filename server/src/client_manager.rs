//! Registry of open connections and their player identities
//!
//! This module tracks every connection that completed the handshake:
//! - Player id allocation (lowest id not held by an open connection)
//! - Deregistration when a connection closes
//! - Broadcast and point-to-point delivery of encoded messages
//!
//! Sockets still in the handshake are tracked separately so the operator can
//! reach them too. `register` moves a connection from one set to the other
//! while holding both locks (always `handshaking` first).
//!
//! Broadcast takes a snapshot of the registry under the read lock and sends
//! outside it, so registration never waits on a slow peer.

use crate::connection::Connection;
use crate::error::ServerError;
use log::{info, warn};
use shared::{Message, MAX_PLAYERS};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct ClientManager {
    /// Accepted connections that have no player id yet
    handshaking: RwLock<Vec<Arc<Connection>>>,
    /// Open connections indexed by their player id
    clients: RwLock<BTreeMap<u8, Arc<Connection>>>,
    /// Maximum number of concurrent players allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry. Capacity is clamped to what one id byte can address.
    pub fn new(max_clients: usize) -> Self {
        Self {
            handshaking: RwLock::new(Vec::new()),
            clients: RwLock::new(BTreeMap::new()),
            max_clients: max_clients.clamp(1, MAX_PLAYERS),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_clients
    }

    /// Assigns the lowest free id to `conn` and records it.
    ///
    /// Fails with `RegistryFull` when every id below the capacity is held.
    pub async fn register(&self, conn: &Arc<Connection>) -> Result<u8, ServerError> {
        if let Some(id) = conn.player_id() {
            return Err(ServerError::StateConsistency(format!(
                "{} already registered as {}",
                conn, id
            )));
        }

        let mut handshaking = self.handshaking.write().await;
        let mut clients = self.clients.write().await;
        let id = lowest_free_id(&clients, self.max_clients).ok_or(ServerError::RegistryFull)?;

        conn.assign(id);
        clients.insert(id, Arc::clone(conn));
        handshaking.retain(|c| !Arc::ptr_eq(c, conn));
        info!("Client {} registered from {}", id, conn.peer());
        Ok(id)
    }

    /// Removes `conn`. Returns false if it was not registered (or already removed).
    pub async fn unregister(&self, conn: &Arc<Connection>) -> bool {
        let Some(id) = conn.player_id() else {
            return false;
        };

        let mut clients = self.clients.write().await;
        match clients.get(&id) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                clients.remove(&id);
                info!("Client {} unregistered", id);
                true
            }
            _ => false,
        }
    }

    /// Records a freshly accepted connection.
    pub async fn begin_handshake(&self, conn: &Arc<Connection>) {
        self.handshaking.write().await.push(Arc::clone(conn));
    }

    /// Forgets a connection that will never be registered.
    pub async fn abandon_handshake(&self, conn: &Arc<Connection>) {
        self.handshaking
            .write()
            .await
            .retain(|c| !Arc::ptr_eq(c, conn));
    }

    /// Whether `conn` is the connection currently holding its player id.
    pub async fn is_current(&self, conn: &Arc<Connection>) -> bool {
        let Some(id) = conn.player_id() else {
            return false;
        };
        matches!(self.clients.read().await.get(&id), Some(current) if Arc::ptr_eq(current, conn))
    }

    pub async fn has_capacity(&self) -> bool {
        self.clients.read().await.len() < self.max_clients
    }

    pub async fn get(&self, id: u8) -> Option<Arc<Connection>> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Snapshot of all registered connections, ordered by id.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.clients.read().await.values().cloned().collect()
    }

    /// Every accepted connection, handshaking ones first, then registered by id.
    pub async fn everyone(&self) -> Vec<Arc<Connection>> {
        let handshaking = self.handshaking.read().await;
        let clients = self.clients.read().await;
        handshaking.iter().chain(clients.values()).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Sends `message` to every registered connection.
    pub async fn broadcast(&self, message: &Message) -> Result<(), ServerError> {
        let recipients = self.connections().await;
        broadcast_to(&recipients, message).await
    }

    /// Point-to-point delivery.
    pub async fn send(&self, conn: &Connection, message: &Message) -> Result<(), ServerError> {
        conn.send(message).await
    }
}

fn lowest_free_id(clients: &BTreeMap<u8, Arc<Connection>>, max_clients: usize) -> Option<u8> {
    (0..max_clients)
        .map(|id| id as u8)
        .find(|id| !clients.contains_key(id))
}

/// Best-effort delivery to a fixed set of recipients.
///
/// Every recipient is attempted. Failures that only mean the peer is gone
/// are swallowed; the first other failure is returned once all sends finish.
pub async fn broadcast_to(
    recipients: &[Arc<Connection>],
    message: &Message,
) -> Result<(), ServerError> {
    if recipients.is_empty() {
        return Ok(());
    }

    let frame = shared::frame::encode_frame(message)?;
    let mut first_error = None;

    for conn in recipients {
        if let Err(e) = conn.send_frame(&frame).await {
            if e.is_benign() {
                continue;
            }
            warn!("Failed to send {} to {}: {}", message.name(), conn, e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
