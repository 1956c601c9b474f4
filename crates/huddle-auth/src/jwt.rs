//! HS256 token verification.
//!
//! Tokens carry `sub` (user id), `name` (display name), and `exp`. Expiry is
//! enforced by the decoder, so an expired token surfaces as
//! `AuthError::InvalidCredential`.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use huddle_core::{Identity, UserId};

use crate::errors::AuthError;
use crate::verifier::CredentialVerifier;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    exp: i64,
}

/// Verifies HS256-signed bearer tokens against a shared secret.
pub struct JwtVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(credential, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))?;
        Ok(Identity::new(
            UserId::from_raw(data.claims.sub),
            data.claims.name,
        ))
    }
}

/// Issue a token for the given identity, valid for `ttl_secs`.
/// Used by tests and local tooling; production tokens come from the
/// surrounding application's identity service.
pub fn sign_token(
    secret: &[u8],
    user_id: &UserId,
    username: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.as_str().to_owned(),
        name: username.to_owned(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}
