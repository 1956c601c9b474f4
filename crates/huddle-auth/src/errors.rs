//! Auth error types.

use huddle_core::ErrorKind;

/// Errors produced while authenticating a connection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AuthError {
    /// The handshake carried no credential. Raised before any verifier call.
    #[error("no credential presented")]
    MissingCredential,

    /// The credential failed verification (malformed, expired, or unknown).
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::InvalidCredential(_) => ErrorKind::InvalidCredential,
        }
    }
}
