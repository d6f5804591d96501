//! Magic-link accounts and API key secret hashing.
//!
//! Issues and burns one-time login tokens and runs Argon2 over API key
//! secrets. Session JWTs are handled in the auth middleware.

use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};

use crate::db::{ConsumeResult, DbPool, MagicTokenRepository, UserRepository};
use crate::models::User;

/// Authentication service for the magic-link flow
pub struct AuthService {
    pool: DbPool,
}

impl AuthService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Hash an API key secret using Argon2id
    pub fn hash_secret(secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash secret: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verify an API key secret against a stored hash
    pub fn verify_secret(secret: &str, secret_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(secret_hash)
            .map_err(|e| anyhow::anyhow!("Invalid secret hash format: {e}"))?;
        let outcome = Argon2::default().verify_password(secret.as_bytes(), &parsed);
        Ok(outcome.is_ok())
    }

    /// Generate an opaque magic-link token (32 random bytes, hex encoded)
    pub fn generate_magic_token() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Canonical form of an email address for storage and comparison
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Issue a fresh magic token for the given (normalized) email.
    ///
    /// Creates the user account if this is the first time the address is
    /// seen. Any earlier unused tokens for the user stop working.
    pub async fn request_magic_link(&self, email: &str, ttl_hours: u64) -> Result<(User, String)> {
        let user = UserRepository::new(&self.pool).find_or_create(email).await?;

        let token = Self::generate_magic_token();
        let expires_at = Utc::now() + Duration::hours(ttl_hours as i64);

        MagicTokenRepository::new(&self.pool)
            .issue(user.id, &token, expires_at)
            .await?;

        Ok((user, token))
    }

    /// Burn a magic token and report the outcome
    pub async fn consume_magic_token(&self, token: &str) -> Result<ConsumeResult> {
        MagicTokenRepository::new(&self.pool).consume(token).await
    }
}
