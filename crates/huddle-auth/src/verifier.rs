//! The external identity-verifier contract.

use std::collections::HashMap;

use async_trait::async_trait;
use huddle_core::Identity;

use crate::errors::AuthError;

/// Resolves a credential to an identity.
///
/// This is the boundary toward the external identity store: implementations
/// may call out over the network, so `verify` is a suspension point and must
/// never be invoked while any registry lock is held.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Fixed token → identity table. Intended for tests and local development.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl CredentialVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredential("unknown token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::UserId;

    #[tokio::test]
    async fn known_token_resolves() {
        let verifier = StaticTokenVerifier::new()
            .insert("tok-1", Identity::new(UserId::from_raw("user_1"), "ada"));

        let identity = verifier.verify("tok-1").await.unwrap();
        assert_eq!(identity.username, "ada");
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let verifier = StaticTokenVerifier::new();
        let err = verifier.verify("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredential(_)));
    }
}
