//! Gate every inbound connection through a single verification attempt.

use std::sync::Arc;

use huddle_core::Identity;
use tracing::debug;

use crate::errors::AuthError;
use crate::verifier::CredentialVerifier;

/// Validates the credential carried by an inbound connection's handshake.
///
/// A missing credential fails fast, before the verifier is touched. The
/// caller owns the one-attempt-per-connection rule: a connection that fails
/// here is closed, not retried.
pub struct Authenticator {
    verifier: Arc<dyn CredentialVerifier>,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let credential = credential.ok_or(AuthError::MissingCredential)?;
        let identity = self.verifier.verify(credential).await?;
        debug!(user_id = %identity.user_id, "credential verified");
        Ok(identity)
    }
}
