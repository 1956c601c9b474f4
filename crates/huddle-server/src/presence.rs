//! Process-wide map from identity to its live connections.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use huddle_core::{Identity, UserId};

use crate::connection::ClientConnection;

/// Tracks which identities are currently reachable and where.
///
/// The map is sharded by identity, so `register`, `deregister`, and `lookup`
/// are each atomic with respect to one another; readers never observe a
/// partially updated set. No external call happens under a shard lock.
pub struct PresenceRegistry {
    entries: DashMap<UserId, Vec<Arc<ClientConnection>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Add a connection under the identity's set.
    ///
    /// Extends the set, never overwrites it (multi-device). A connection
    /// already bound to a different identity is refused; registering the same
    /// connection twice is a no-op.
    pub fn register(&self, identity: &Identity, conn: Arc<ClientConnection>) {
        if !conn.bind_identity(identity.clone()) {
            let bound = conn.identity().map(|i| i.user_id);
            if bound.as_ref() != Some(&identity.user_id) {
                warn!(
                    conn_id = %conn.id,
                    user_id = %identity.user_id,
                    "connection already bound to another identity, refusing registration"
                );
                return;
            }
        }

        let mut entry = self.entries.entry(identity.user_id.clone()).or_default();
        if entry.iter().any(|c| c.id == conn.id) {
            return;
        }
        entry.push(conn);
        debug!(
            user_id = %identity.user_id,
            connections = entry.len(),
            "connection registered"
        );
    }

    /// Remove a connection from whatever identity set contains it.
    ///
    /// A no-op when the connection was never registered or was already
    /// removed, so double disconnects are harmless. Returns the identity's
    /// `UserId` exactly once, when this call removed its last connection.
    pub fn deregister(&self, conn: &ClientConnection) -> Option<UserId> {
        let user_id = conn.identity()?.user_id;

        let removed = match self.entries.get_mut(&user_id) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|c| c.id != conn.id);
                before != entry.len()
            }
            None => false,
        };
        if !removed {
            return None;
        }

        debug!(user_id = %user_id, conn_id = %conn.id, "connection deregistered");
        if self.entries.remove_if(&user_id, |_, conns| conns.is_empty()).is_some() {
            Some(user_id)
        } else {
            None
        }
    }

    /// Snapshot of the identity's currently live connections.
    ///
    /// Callers must tolerate a connection disappearing between lookup and
    /// delivery; a failed send to a vanished connection is the offline case,
    /// not an error.
    pub fn lookup(&self, user_id: &UserId) -> Vec<Arc<ClientConnection>> {
        self.entries
            .get(user_id)
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Total live connections across all identities.
    pub fn connection_count(&self) -> usize {
        self.entries.iter().map(|e| e.len()).sum()
    }

    /// Number of identities with at least one live connection.
    pub fn identity_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
