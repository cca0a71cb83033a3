//! Connection registry: the authoritative set of open sockets for one population.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::connection::{ConnectionHandle, ConnectionId, ConnectionState, Population};

/// Set of currently open connections for one population.
///
/// Every operation takes the lock briefly and never across an await;
/// fan-out works from a [`snapshot`](Self::snapshot) taken under the lock and
/// sends with the lock released.
#[derive(Debug)]
pub struct ConnectionRegistry {
    population: Population,
    members: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new(population: Population) -> Self {
        Self {
            population,
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn population(&self) -> Population {
        self.population
    }

    fn members(&self) -> MutexGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        // A panic while holding the lock cannot leave the map half-updated,
        // so a poisoned guard is still safe to use.
        self.members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a connection. Returns `false` if it was already present.
    pub fn add(&self, conn: ConnectionHandle) -> bool {
        let mut members = self.members();
        if members.contains_key(&conn.id()) {
            return false;
        }
        members.insert(conn.id(), conn);
        true
    }

    /// Remove a connection. Returns `false` if it was not present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.members().remove(&id).is_some()
    }

    pub fn size(&self) -> usize {
        self.members().len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members().contains_key(&id)
    }

    /// Point-in-time copy of the membership, safe to iterate while the
    /// registry keeps changing.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.members().values().cloned().collect()
    }
}

/// Keeps a connection registered for as long as it is alive.
///
/// Marks the connection `Open` and adds it on creation; dropping the guard
/// marks it `Closed` and removes it, whichever way the owning task ends.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    handle: ConnectionHandle,
}

impl Registration {
    pub fn new(registry: Arc<ConnectionRegistry>, handle: ConnectionHandle) -> Self {
        handle.transition(ConnectionState::Open);
        registry.add(handle.clone());
        Self { registry, handle }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.handle.transition(ConnectionState::Closed);
        if self.registry.remove(self.handle.id()) {
            debug!(
                population = %self.registry.population(),
                conn_id = %self.handle.id(),
                "connection deregistered"
            );
        }
    }
}
