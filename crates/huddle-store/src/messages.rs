use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Row;
use tracing::instrument;

use huddle_core::ids::{MessageId, RoomId, UserId};
use huddle_core::message::{NewMessage, Recipient, StoredMessage};
use huddle_core::store::MessageStore;
use huddle_core::StoreError;

use crate::database::{db_err, Database};

/// Message persistence over SQLite.
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a message. Direct messages start undelivered; room messages
    /// are stored once for the whole room.
    #[instrument(skip(self, message), fields(sender = %message.sender))]
    pub fn insert(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        let id = MessageId::new();
        let now = Utc::now().to_rfc3339();

        let (recipient_id, room_id) = match &message.recipient {
            Recipient::User(user) => (Some(user.as_str()), None),
            Recipient::Room(room) => (None, Some(room.as_str())),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, sender_name, recipient_id, room_id, payload, delivered, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![
                    id.as_str(),
                    message.sender.as_str(),
                    message.sender_name,
                    recipient_id,
                    room_id,
                    message.payload,
                    now,
                ],
            )
            .map_err(db_err)?;

            Ok(StoredMessage {
                id,
                sender: message.sender.clone(),
                sender_name: message.sender_name.clone(),
                recipient: message.recipient.clone(),
                payload: message.payload.clone(),
                created_at: now,
                delivered: false,
            })
        })
    }

    /// Undelivered direct messages for a recipient, oldest first.
    #[instrument(skip(self), fields(recipient = %recipient))]
    pub fn undelivered_for(&self, recipient: &UserId) -> Result<Vec<StoredMessage>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, sender_id, sender_name, recipient_id, room_id, payload, delivered, created_at
                     FROM messages
                     WHERE recipient_id = ?1 AND delivered = 0
                     ORDER BY created_at ASC, id ASC",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([recipient.as_str()], row_to_message)
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }

    /// Flag messages as delivered.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn set_delivered(&self, ids: &[MessageId]) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("UPDATE messages SET delivered = 1 WHERE id = ?1")
                .map_err(db_err)?;
            for id in ids {
                stmt.execute([id.as_str()]).map_err(db_err)?;
            }
            Ok(())
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(db_err)
        })
    }
}

fn row_to_message(row: &Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    let recipient_id: Option<String> = row.get(3)?;
    let room_id: Option<String> = row.get(4)?;
    let recipient = match (recipient_id, room_id) {
        (Some(user), _) => Recipient::User(UserId::from_raw(user)),
        (None, Some(room)) => Recipient::Room(RoomId::from_raw(room)),
        (None, None) => {
            return Err(rusqlite::Error::InvalidColumnType(
                3,
                "recipient_id/room_id".into(),
                rusqlite::types::Type::Null,
            ))
        }
    };
    Ok(StoredMessage {
        id: MessageId::from_raw(row.get::<_, String>(0)?),
        sender: UserId::from_raw(row.get::<_, String>(1)?),
        sender_name: row.get(2)?,
        recipient,
        payload: row.get(5)?,
        delivered: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

#[async_trait]
impl MessageStore for MessageRepo {
    async fn persist(&self, message: NewMessage) -> Result<StoredMessage, StoreError> {
        self.insert(message)
    }

    async fn fetch_undelivered(
        &self,
        recipient: &UserId,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.undelivered_for(recipient)
    }

    async fn mark_delivered(&self, ids: &[MessageId]) -> Result<(), StoreError> {
        self.set_delivered(ids)
    }
}
