//! Magic token repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;

/// Outcome of consuming a magic token
///
/// A used token is indistinguishable from one that never existed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeResult {
    /// Token was unused and within its validity window
    Valid { email: String },
    /// Token existed but its expiry had passed; it is burned anyway
    Expired,
    /// No unused token with this value
    NotFound,
}

#[derive(Debug, sqlx::FromRow)]
struct PendingTokenRow {
    expires_at: String,
    email: String,
}

pub struct MagicTokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MagicTokenRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a freshly issued token, invalidating any earlier unused tokens
    /// for the same user.
    pub async fn issue(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM magic_tokens WHERE user_id = ? AND used = 0")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to invalidate previous tokens")?;

        sqlx::query("INSERT INTO magic_tokens (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id.to_string())
            .bind(expires_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .context("Failed to store magic token")?;

        tx.commit().await.context("Failed to commit magic token")?;

        Ok(())
    }

    /// Burn a token and report whether it was still valid.
    ///
    /// The token is marked used even when expired, so a second attempt
    /// always comes back `NotFound`.
    pub async fn consume(&self, token: &str) -> Result<ConsumeResult> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let row = sqlx::query_as::<_, PendingTokenRow>(
            r#"
            SELECT mt.expires_at, u.email
            FROM magic_tokens mt
            JOIN users u ON u.id = mt.user_id
            WHERE mt.token = ? AND mt.used = 0
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up magic token")?;

        let Some(row) = row else {
            return Ok(ConsumeResult::NotFound);
        };

        sqlx::query("UPDATE magic_tokens SET used = 1 WHERE token = ?")
            .bind(token)
            .execute(&mut *tx)
            .await
            .context("Failed to burn magic token")?;

        tx.commit().await.context("Failed to commit token burn")?;

        if parse_db_timestamp(&row.expires_at) < Utc::now() {
            return Ok(ConsumeResult::Expired);
        }

        Ok(ConsumeResult::Valid { email: row.email })
    }
}
