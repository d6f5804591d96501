//! Account and sign-in wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account row
///
/// Users are identified by their email address; accounts are created lazily
/// on the first magic-link request and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Request for an emailed magic link
#[derive(Debug, Clone, Deserialize)]
pub struct MagicLinkRequest {
    #[serde(default)]
    pub email: String,
}

/// Response to a magic-link request
#[derive(Debug, Clone, Serialize)]
pub struct MagicLinkResponse {
    pub success: bool,
    pub message: String,
    /// Only populated in development mode, where no email is sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magic_link: Option<String>,
}

/// Response for the authenticated identity endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub email: String,
}
