//! SQLite access for API keys.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::ApiKey;

/// Raw row; SQLite hands timestamps back as text
#[derive(Debug, sqlx::FromRow)]
struct KeyRow {
    id: String,
    name: String,
    created_at: String,
    last_used_at: Option<String>,
    revoked: bool,
}

/// Credential material for verifying a presented key
#[derive(Debug, sqlx::FromRow)]
pub struct ApiKeyAuthData {
    pub key_hash: String,
    pub revoked: bool,
    pub email: String,
}

pub struct ApiKeyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        id: Uuid,
        user_id: Uuid,
        name: &str,
        key_hash: &str,
    ) -> Result<ApiKey> {
        sqlx::query("INSERT INTO api_keys (id, user_id, name, key_hash) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .bind(name)
            .bind(key_hash)
            .execute(self.pool)
            .await
            .context("Failed to insert API key")?;

        let row = sqlx::query_as::<_, KeyRow>(
            r#"
            SELECT id, name, created_at, last_used_at, revoked
            FROM api_keys
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_one(self.pool)
        .await
        .context("Failed to read back inserted key")?;

        row_to_api_key(row)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>> {
        let rows = sqlx::query_as::<_, KeyRow>(
            r#"
            SELECT id, name, created_at, last_used_at, revoked
            FROM api_keys
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(self.pool)
        .await
        .context("Failed to list API keys")?;

        rows.into_iter().map(row_to_api_key).collect()
    }

    /// Load the hash and owner needed to verify a presented key.
    pub async fn find_auth_data(&self, id: Uuid) -> Result<Option<ApiKeyAuthData>> {
        sqlx::query_as::<_, ApiKeyAuthData>(
            r#"
            SELECT ak.key_hash, ak.revoked, u.email
            FROM api_keys ak
            JOIN users u ON u.id = ak.user_id
            WHERE ak.id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await
        .context("Failed to look up API key")
    }

    /// Mark a key revoked. Returns false when the key does not exist or
    /// belongs to another user.
    pub async fn revoke(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET revoked = 1 WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to revoke API key")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = datetime('now') WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await
            .context("Failed to record key usage")?;

        Ok(())
    }

    /// Refresh the usage timestamp on every key owned by the given email.
    pub async fn touch_last_used_by_email(&self, email: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE api_keys
            SET last_used_at = datetime('now')
            WHERE user_id = (SELECT id FROM users WHERE email = ?)
            "#,
        )
        .bind(email)
        .execute(self.pool)
        .await
        .context("Failed to record key usage")?;

        Ok(())
    }
}

fn row_to_api_key(row: KeyRow) -> Result<ApiKey> {
    Ok(ApiKey {
        id: Uuid::parse_str(&row.id).context("Stored key id is not a UUID")?,
        name: row.name,
        created_at: parse_db_timestamp(&row.created_at),
        last_used_at: row.last_used_at.as_deref().map(parse_db_timestamp),
        revoked: row.revoked,
    })
}
