use async_trait::async_trait;

use crate::errors::StoreError;
use crate::ids::{MessageId, UserId};
use crate::message::{NewMessage, StoredMessage};

/// Contract toward the external message store.
///
/// The router persists every message through this trait before attempting
/// delivery and treats each call as an atomic external operation: it either
/// succeeds or fails, with no partial-write visibility. Transactional
/// guarantees are the implementation's concern.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Must succeed before any delivery is attempted.
    async fn persist(&self, message: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Direct messages addressed to `recipient` that have not yet reached a
    /// live connection, oldest first.
    async fn fetch_undelivered(&self, recipient: &UserId) -> Result<Vec<StoredMessage>, StoreError>;

    /// Mark messages as delivered after a successful push to at least one
    /// live connection.
    async fn mark_delivered(&self, ids: &[MessageId]) -> Result<(), StoreError>;
}
