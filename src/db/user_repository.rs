//! User repository

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::parse_db_timestamp;
use crate::models::User;

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    created_at: String,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a user by email, creating the account on first sight.
    ///
    /// Safe to call concurrently for the same address; the unique constraint
    /// on email turns the racing insert into a no-op.
    pub async fn find_or_create(&self, email: &str) -> Result<User> {
        sqlx::query("INSERT INTO users (id, email) VALUES (?, ?) ON CONFLICT(email) DO NOTHING")
            .bind(Uuid::new_v4().to_string())
            .bind(email)
            .execute(self.pool)
            .await
            .context("Failed to create user")?;

        let row =
            sqlx::query_as::<_, UserRow>("SELECT id, email, created_at FROM users WHERE email = ?")
                .bind(email)
                .fetch_one(self.pool)
                .await
                .context("Failed to load user")?;

        row_to_user(row)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row =
            sqlx::query_as::<_, UserRow>("SELECT id, email, created_at FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(self.pool)
                .await
                .context("Failed to look up user")?;

        row.map(row_to_user).transpose()
    }
}

fn row_to_user(row: UserRow) -> Result<User> {
    Ok(User {
        id: Uuid::parse_str(&row.id).context("Invalid user id")?,
        email: row.email,
        created_at: parse_db_timestamp(&row.created_at),
    })
}
