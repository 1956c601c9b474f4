//! Room membership: named sets of identities for broadcast routing.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::debug;

use huddle_core::{RoomId, UserId};

/// In-memory room membership, sharded by room.
///
/// Membership follows identities, not connections: a user in a room receives
/// room traffic on every live device. Membership is dropped when the user's
/// last connection goes away.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashSet<UserId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn join(&self, room: RoomId, user: UserId) {
        let mut members = self.rooms.entry(room.clone()).or_default();
        if members.insert(user.clone()) {
            debug!(room = %room, user_id = %user, members = members.len(), "joined room");
        }
    }

    /// Remove a user from a room; a no-op if they were not a member.
    pub fn leave(&self, room: &RoomId, user: &UserId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            if members.remove(user) {
                debug!(room = %room, user_id = %user, "left room");
            }
        }
        let _ = self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Remove a user from every room (last connection gone).
    pub fn leave_all(&self, user: &UserId) {
        let emptied: Vec<RoomId> = self
            .rooms
            .iter_mut()
            .filter_map(|mut entry| {
                entry.value_mut().remove(user);
                if entry.value().is_empty() {
                    Some(entry.key().clone())
                } else {
                    None
                }
            })
            .collect();
        for room in emptied {
            let _ = self.rooms.remove_if(&room, |_, members| members.is_empty());
        }
    }

    /// Snapshot of a room's members (possibly empty).
    pub fn members(&self, room: &RoomId) -> Vec<UserId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
