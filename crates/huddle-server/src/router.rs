//! Inbound message routing: validate, persist, then fan out to live
//! connections.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use huddle_core::frames::ServerFrame;
use huddle_core::message::{NewMessage, Recipient, StoredMessage};
use huddle_core::{
    ConnectionId, ErrorKind, Identity, MessageId, MessageStore, RoomId, RoutingError, UserId,
    ValidationError,
};

use crate::presence::PresenceRegistry;
use crate::rooms::RoomRegistry;

/// Why a route attempt failed. Either way the triggering message reaches no
/// one; validation failures are additionally never persisted.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl RouteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(e) => e.kind(),
            Self::Routing(e) => e.kind(),
        }
    }
}

/// Outcome of a successful route attempt.
///
/// `delivered_to == 0` is the normal offline case: the message is stored and
/// nothing else happens.
#[derive(Clone, Debug)]
pub struct RouteResult {
    pub message_id: MessageId,
    pub delivered_to: usize,
}

/// Routes messages from authenticated sessions to their recipients.
///
/// Persistence always precedes delivery: an unpersisted message is never
/// pushed to a socket, and a persisted one survives every delivery failure.
pub struct MessageRouter {
    store: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    max_payload_bytes: usize,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn MessageStore>,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRegistry>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            store,
            presence,
            rooms,
            max_payload_bytes,
        }
    }

    /// Route a direct message to a single identity, fanning out to all of its
    /// live connections.
    #[instrument(skip(self, payload), fields(sender = %sender.user_id, recipient = %recipient))]
    pub async fn route_direct(
        &self,
        sender: &Identity,
        recipient: UserId,
        payload: String,
    ) -> Result<RouteResult, RouteError> {
        self.validate(recipient.as_str(), &payload)?;

        let stored = self
            .store
            .persist(NewMessage {
                sender: sender.user_id.clone(),
                sender_name: sender.username.clone(),
                recipient: Recipient::User(recipient.clone()),
                payload,
            })
            .await
            .map_err(|e| RoutingError::PersistenceFailed(e.to_string()))?;

        let delivered_to = self.fan_out(&stored, &recipient, None);
        if delivered_to > 0 {
            self.flag_delivered(&stored.id).await;
        } else {
            debug!(message_id = %stored.id, "recipient offline, message stored");
        }

        Ok(RouteResult {
            message_id: stored.id,
            delivered_to,
        })
    }

    /// Route a message to every member of a room, each with the same
    /// per-recipient semantics as a direct message. The originating
    /// connection is excluded; the sender's other devices still receive.
    #[instrument(skip(self, payload), fields(sender = %sender.user_id, room = %room))]
    pub async fn route_room(
        &self,
        sender: &Identity,
        origin: &ConnectionId,
        room: RoomId,
        payload: String,
    ) -> Result<RouteResult, RouteError> {
        self.validate(room.as_str(), &payload)?;

        let stored = self
            .store
            .persist(NewMessage {
                sender: sender.user_id.clone(),
                sender_name: sender.username.clone(),
                recipient: Recipient::Room(room.clone()),
                payload,
            })
            .await
            .map_err(|e| RoutingError::PersistenceFailed(e.to_string()))?;

        let mut delivered_to = 0;
        for member in self.rooms.members(&room) {
            delivered_to += self.fan_out(&stored, &member, Some(origin));
        }
        if delivered_to > 0 {
            self.flag_delivered(&stored.id).await;
        }

        Ok(RouteResult {
            message_id: stored.id,
            delivered_to,
        })
    }

    fn validate(&self, target: &str, payload: &str) -> Result<(), ValidationError> {
        if target.trim().is_empty() {
            return Err(ValidationError::MalformedMessage(
                "recipient missing".into(),
            ));
        }
        if payload.is_empty() {
            return Err(ValidationError::MalformedMessage("empty payload".into()));
        }
        if payload.len() > self.max_payload_bytes {
            return Err(ValidationError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }

    /// Push a persisted message to each of a recipient's live connections.
    ///
    /// Deliveries are independent: one slow or vanished connection never
    /// blocks the others and never rolls back persistence. Returns how many
    /// connections accepted the frame.
    fn fan_out(
        &self,
        message: &StoredMessage,
        recipient: &UserId,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let json = match serde_json::to_string(&ServerFrame::from_stored(message)) {
            Ok(j) => j,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to serialize message frame");
                return 0;
            }
        };

        let mut delivered = 0;
        for conn in self.presence.lookup(recipient) {
            if exclude == Some(&conn.id) {
                continue;
            }
            if conn.send_raw(json.clone()) {
                delivered += 1;
            } else {
                warn!(
                    conn_id = %conn.id,
                    message_id = %message.id,
                    kind = ErrorKind::DeliveryFailed.as_str(),
                    "failed to deliver to connection"
                );
            }
        }
        delivered
    }

    /// Best-effort delivered flag; the message is already durable either way.
    async fn flag_delivered(&self, id: &MessageId) {
        if let Err(e) = self.store.mark_delivered(std::slice::from_ref(id)).await {
            warn!(message_id = %id, error = %e, "failed to mark message delivered");
        }
    }
}
