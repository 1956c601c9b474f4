//! Connection authentication: the credential-verifier contract and the
//! authenticator that gates every inbound connection.
//!
//! A connection presents a credential in its handshake metadata; the
//! [`Authenticator`] resolves it to an [`huddle_core::Identity`] through a
//! [`CredentialVerifier`] or rejects the connection. Exactly one attempt is
//! made per connection and the raw credential is never logged or persisted.

pub mod authenticator;
pub mod errors;
pub mod jwt;
pub mod verifier;

pub use authenticator::Authenticator;
pub use errors::AuthError;
pub use jwt::{sign_token, JwtVerifier};
pub use verifier::{CredentialVerifier, StaticTokenVerifier};
