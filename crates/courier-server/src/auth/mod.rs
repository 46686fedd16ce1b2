//! Authentication: token issuance/verification and credential storage.
//!
//! Tokens are HMAC-SHA256 signed: `base64url(user:expiry).base64url(mac)`.
//! The relay core consumes verification through its `IdentityVerifier`
//! contract and never sees how tokens are minted.

mod users;

pub use users::UserStore;

use std::future::Future;

use base64::prelude::*;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use courier_relay::{IdentityVerifier, RelayError, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token is malformed or its signature does not verify
    #[error("invalid credential")]
    InvalidCredential,

    /// Token signature verifies but the token has expired
    #[error("token expired")]
    TokenExpired,

    /// Username is already taken
    #[error("username already taken")]
    UserExists,

    /// Username does not meet the format requirements
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// Unknown username or wrong password
    #[error("invalid username or password")]
    BadLogin,

    /// Password hashing failure
    #[error("password hashing error: {0}")]
    Hash(String),

    /// Database failure
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Mints and verifies signed authentication tokens.
pub struct TokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenService {
    /// Create a token service with a signing secret and token lifetime.
    pub fn new(secret: impl AsRef<[u8]>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Mint a token for a user, valid for the configured lifetime.
    pub fn mint(&self, user: &UserId) -> String {
        let expires_at = (Utc::now() + self.ttl).timestamp();
        let payload = format!("{}:{}", user, expires_at);
        let signature = self.sign(payload.as_bytes());
        format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(payload),
            BASE64_URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify a token, returning the identity it was minted for.
    pub fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(AuthError::InvalidCredential)?;

        let payload = BASE64_URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidCredential)?;
        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidCredential)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidCredential)?;

        let payload = String::from_utf8(payload).map_err(|_| AuthError::InvalidCredential)?;
        let (user, expires_at) = payload
            .rsplit_once(':')
            .ok_or(AuthError::InvalidCredential)?;
        let expires_at: i64 = expires_at.parse().map_err(|_| AuthError::InvalidCredential)?;

        if expires_at < Utc::now().timestamp() {
            debug!(user = %user, "Rejected expired token");
            return Err(AuthError::TokenExpired);
        }

        Ok(UserId::from(user))
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl IdentityVerifier for TokenService {
    fn verify(
        &self,
        credential: &str,
    ) -> impl Future<Output = Result<UserId, RelayError>> + Send {
        let result = self
            .verify_token(credential)
            .map_err(|e| RelayError::auth_failed(e.to_string()));
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", 3600)
    }

    #[test]
    fn test_mint_verify_round_trip() {
        let tokens = service();
        let token = tokens.mint(&UserId::from("alice"));
        assert_eq!(tokens.verify_token(&token).unwrap(), UserId::from("alice"));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let tokens = service();
        assert!(matches!(
            tokens.verify_token("not-a-token"),
            Err(AuthError::InvalidCredential)
        ));
        assert!(matches!(
            tokens.verify_token("a.b"),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let tokens = service();
        let token = tokens.mint(&UserId::from("alice"));
        let (_, signature) = token.split_once('.').unwrap();
        let forged = format!(
            "{}.{}",
            BASE64_URL_SAFE_NO_PAD.encode(format!("mallory:{}", i64::MAX)),
            signature
        );
        assert!(matches!(
            tokens.verify_token(&forged),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = service().mint(&UserId::from("alice"));
        let other = TokenService::new("other-secret", 3600);
        assert!(matches!(
            other.verify_token(&token),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = TokenService::new("test-secret", -60);
        let token = tokens.mint(&UserId::from("alice"));
        assert!(matches!(
            tokens.verify_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_identity_verifier_contract() {
        let tokens = service();
        let token = tokens.mint(&UserId::from("alice"));

        let user = IdentityVerifier::verify(&tokens, &token).await.unwrap();
        assert_eq!(user, UserId::from("alice"));

        assert!(IdentityVerifier::verify(&tokens, "bogus").await.is_err());
    }
}
