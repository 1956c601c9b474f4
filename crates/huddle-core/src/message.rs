use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId, UserId};

/// Destination of a message: a single identity or a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    Room(RoomId),
}

impl Recipient {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User(id) => id.as_str(),
            Self::Room(id) => id.as_str(),
        }
    }
}

/// A validated message ready for persistence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: UserId,
    pub sender_name: String,
    pub recipient: Recipient,
    pub payload: String,
}

/// A persisted message as returned by the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub sender_name: String,
    pub recipient: Recipient,
    pub payload: String,
    pub created_at: String,
    pub delivered: bool,
}
