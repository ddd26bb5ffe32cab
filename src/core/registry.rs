//! Registry of live client connections
//!
//! Holds shared references only: a connection is created and closed by its
//! handler, the registry just tracks who is currently reachable. Broadcasts
//! work on a copied snapshot so registration never races a send loop.

use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::connection::Connection;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any previous entry with the same id
    pub fn register(&self, connection: Arc<Connection>) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = connection.id.clone();
        connections.insert(id.clone(), connection);
        info!("Client registered: {} (connections: {})", id, connections.len());
    }

    /// Remove a connection. Returns false if it was not registered.
    pub fn deregister(&self, id: &str) -> bool {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match connections.remove(id) {
            Some(_) => {
                info!("Client deregistered: {} (connections: {})", id, connections.len());
                true
            }
            None => {
                debug!("Deregister ignored for unknown client {}", id);
                false
            }
        }
    }

    /// Copy of the current population for one broadcast
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Thread-safe registry shared by the acceptor and the poller
pub type SharedRegistry = Arc<ConnectionRegistry>;

pub fn create_registry() -> SharedRegistry {
    Arc::new(ConnectionRegistry::new())
}

/// Deregisters its connection when dropped, whatever path the handler
/// leaves through
pub struct RegistrationGuard {
    registry: SharedRegistry,
    id: String,
}

impl RegistrationGuard {
    pub fn register(registry: SharedRegistry, connection: Arc<Connection>) -> Self {
        let id = connection.id.clone();
        registry.register(connection);
        Self { registry, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
    }
}
