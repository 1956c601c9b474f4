use serde::{Deserialize, Serialize};

/// Wire-level error tag carried on error-channel frames.
/// Every error in the taxonomy maps onto exactly one kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingCredential,
    InvalidCredential,
    MalformedMessage,
    PayloadTooLarge,
    PersistenceFailed,
    DeliveryFailed,
}

impl ErrorKind {
    /// Short classification string for logging/metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::MalformedMessage => "malformed_message",
            Self::PayloadTooLarge => "payload_too_large",
            Self::PersistenceFailed => "persistence_failed",
            Self::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Message-shape failures. Terminal for the triggering message only; the
/// connection stays open and nothing is persisted.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("payload too large: {size} > {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedMessage(_) => ErrorKind::MalformedMessage,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
        }
    }
}

/// Routing failures after validation passed.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RoutingError {
    /// The store rejected the message. Fatal for the route attempt: the
    /// message is reported to the sender and delivered to no one.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
    /// A single live connection could not be reached. Non-fatal: other
    /// devices still receive the message and persistence stands.
    #[error("delivery failed for connection {connection_id}")]
    DeliveryFailed { connection_id: String },
}

impl RoutingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PersistenceFailed(_) => ErrorKind::PersistenceFailed,
            Self::DeliveryFailed { .. } => ErrorKind::DeliveryFailed,
        }
    }

    /// Whether this error fails the whole route attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PersistenceFailed(_))
    }
}

/// Errors surfaced by the message store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
