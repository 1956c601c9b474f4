use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::ids::{MessageId, RoomId, UserId};
use crate::message::{Recipient, StoredMessage};

/// Frames a client may send after the connection is established.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "message.send")]
    MessageSend { recipient: UserId, payload: String },

    #[serde(rename = "room.join")]
    RoomJoin { room: RoomId },

    #[serde(rename = "room.leave")]
    RoomLeave { room: RoomId },

    #[serde(rename = "room.send")]
    RoomSend { room: RoomId, payload: String },
}

/// Frames the server pushes to a client.
///
/// `error` frames form the out-of-band error channel: clients can always
/// distinguish them from `message` frames by the type tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Authenticated-ready signal, sent once after a successful handshake.
    #[serde(rename = "ready")]
    Ready { user_id: UserId, username: String },

    #[serde(rename = "message")]
    Message {
        id: MessageId,
        sender: UserId,
        sender_name: String,
        payload: String,
        created_at: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomId>,
    },

    #[serde(rename = "error")]
    Error { kind: ErrorKind, detail: String },
}

impl ServerFrame {
    /// Build the delivery frame for a persisted message.
    pub fn from_stored(msg: &StoredMessage) -> Self {
        let room = match &msg.recipient {
            Recipient::Room(id) => Some(id.clone()),
            Recipient::User(_) => None,
        };
        Self::Message {
            id: msg.id.clone(),
            sender: msg.sender.clone(),
            sender_name: msg.sender_name.clone(),
            payload: msg.payload.clone(),
            created_at: msg.created_at.clone(),
            room,
        }
    }
}
