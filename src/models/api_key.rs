//! API key model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API key entity
///
/// Only the Argon2 hash of the key secret is persisted; the plaintext key is
/// shown exactly once, in the creation response. The owning user is tracked
/// in the store but never serialized, callers are identified by email only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

/// Request to create a new API key
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    /// Display name for the key (defaults to "API Key" when empty)
    #[serde(default)]
    pub name: String,
}

/// Response when creating a new API key
#[derive(Debug, Clone, Serialize)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub summary: ApiKey,
    /// Plaintext API key (only returned on creation)
    pub api_key: String,
}

/// Response when revoking an API key
#[derive(Debug, Clone, Serialize)]
pub struct RevokeApiKeyResponse {
    pub success: bool,
    pub message: String,
}
