//! Credential storage for registered users.
//!
//! Passwords are hashed with Argon2id; plaintext is never stored.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, instrument};

use courier_relay::UserId;

use super::AuthError;

/// User credential store backed by SQLite.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    /// Create a user store over an initialized pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new user with a hashed password.
    ///
    /// Returns the identity that messaging addresses this user by.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn create(&self, username: &str, password: &str) -> Result<UserId, AuthError> {
        validate_username(username)?;

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .to_string();

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("User registered");
                Ok(UserId::from(username))
            }
            Err(sqlx::Error::Database(db))
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                Err(AuthError::UserExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verify a username/password pair.
    ///
    /// Unknown usernames and wrong passwords are indistinguishable to the
    /// caller.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn verify(&self, username: &str, password: &str) -> Result<UserId, AuthError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM users WHERE username = ?1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        let Some((stored_hash,)) = row else {
            debug!("Unknown username");
            return Err(AuthError::BadLogin);
        };

        let parsed = PasswordHash::new(&stored_hash).map_err(|e| AuthError::Hash(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::BadLogin)?;

        Ok(UserId::from(username))
    }
}

/// Usernames double as routing identities, so keep them to a conservative
/// charset and length.
fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(AuthError::InvalidUsername(
            "must be 3-32 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AuthError::InvalidUsername(
            "only letters, digits, '_' and '-' are allowed".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store() -> UserStore {
        let pool = db::connect(":memory:").await.unwrap();
        db::migrate(&pool).await.unwrap();
        UserStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_verify_user() {
        let users = store().await;

        let id = users.create("alice", "correct horse").await.unwrap();
        assert_eq!(id, UserId::from("alice"));

        let verified = users.verify("alice", "correct horse").await.unwrap();
        assert_eq!(verified, UserId::from("alice"));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let users = store().await;
        users.create("alice", "correct horse").await.unwrap();

        assert!(matches!(
            users.verify("alice", "battery staple").await,
            Err(AuthError::BadLogin)
        ));
    }

    #[tokio::test]
    async fn test_unknown_user_rejected() {
        let users = store().await;
        assert!(matches!(
            users.verify("nobody", "anything").await,
            Err(AuthError::BadLogin)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_username_conflict() {
        let users = store().await;
        users.create("alice", "first").await.unwrap();

        assert!(matches!(
            users.create("alice", "second").await,
            Err(AuthError::UserExists)
        ));
    }

    #[tokio::test]
    async fn test_username_format_enforced() {
        let users = store().await;

        assert!(matches!(
            users.create("ab", "password").await,
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            users.create("has spaces", "password").await,
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(matches!(
            users.create("has:colon", "password").await,
            Err(AuthError::InvalidUsername(_))
        ));
        assert!(users.create("ok_name-1", "password").await.is_ok());
    }
}
