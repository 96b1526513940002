//! Identity verification.
//!
//! [`IdentityVerifier`] is the seam between the request handlers and the
//! identity provider. [`FirebaseAuth`] is the production implementation.

mod firebase;
mod jwks;
mod service_account;

pub use firebase::FirebaseAuth;
pub use jwks::{IdTokenClaims, JwksClient};
pub use service_account::{AccessTokenProvider, ServiceAccountKey};

use async_trait::async_trait;

/// Subject of a successfully verified ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub uid: String,
}

/// User profile as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetchError(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Credential error: {0}")]
    Credentials(String),
    #[error("Identity provider error: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify an ID token and return its subject.
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedToken, AuthError>;

    /// Look up a user's profile by subject.
    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError>;
}
