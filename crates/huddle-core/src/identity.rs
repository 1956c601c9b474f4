use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// The authenticated principal a connection is bound to.
///
/// Resolved exactly once by the authenticator and immutable for the lifetime
/// of the session. Never derived from message payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}
