//! API key lifecycle: create, list, revoke.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    db::{ApiKeyRepository, UserRepository},
    middleware::AuthUser,
    models::{ApiKey, CreateApiKeyRequest, CreateApiKeyResponse, RevokeApiKeyResponse, User},
    services::AuthService,
    utils::AppError,
    AppState,
};

/// Create API key management routes (all require authentication)
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_api_keys).post(create_api_key))
        .route("/{id}", delete(revoke_api_key))
        .route("/revoke/{id}", post(revoke_api_key))
}

async fn require_user(state: &AppState, email: &str) -> Result<User, AppError> {
    UserRepository::new(&state.db)
        .find_by_email(email)
        .await
        .map_err(|e| {
            error!("Failed to load user record for {}: {}", email, e);
            AppError::internal("Failed to resolve user")
        })?
        .ok_or_else(|| {
            error!("No user record for authenticated email {}", email);
            AppError::internal("Failed to resolve user")
        })
}

/// Create a new API key
///
/// POST /api/keys
async fn create_api_key(
    State(state): State<AppState>,
    auth_user: AuthUser,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), AppError> {
    // The body is optional; a bare POST creates a key with the default name
    let requested_name = payload.map(|Json(req)| req.name).unwrap_or_default();
    let name = match requested_name.trim() {
        "" => "API Key".to_string(),
        trimmed => trimmed.to_string(),
    };

    let user = require_user(&state, &auth_user.email).await?;

    let key_id = Uuid::new_v4();
    let mut secret_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut secret_bytes);
    let secret = URL_SAFE_NO_PAD.encode(secret_bytes);
    let plaintext = format!("tbx_{}_{}", key_id, secret);

    // Only the hash of the secret half touches the database
    let key_hash = AuthService::hash_secret(&secret).map_err(|e| {
        error!("Failed to hash API key secret: {}", e);
        AppError::internal("Failed to create API key")
    })?;

    let summary = ApiKeyRepository::new(&state.db)
        .insert(key_id, user.id, &name, &key_hash)
        .await
        .map_err(|e| {
            error!("Failed to store API key: {}", e);
            AppError::internal("Failed to create API key")
        })?;

    info!(email = %auth_user.email, key_id = %key_id, "API key created");

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            summary,
            api_key: plaintext,
        }),
    ))
}

/// List the caller's API keys, newest first
///
/// GET /api/keys
async fn list_api_keys(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Vec<ApiKey>>, AppError> {
    let user = require_user(&state, &auth_user.email).await?;

    let keys = ApiKeyRepository::new(&state.db)
        .list_for_user(user.id)
        .await
        .map_err(|e| {
            error!("Failed to list API keys for {}: {}", auth_user.email, e);
            AppError::internal("Failed to list API keys")
        })?;

    Ok(Json(keys))
}

/// Revoke one of the caller's API keys
///
/// DELETE /api/keys/{id} (or POST /api/keys/revoke/{id})
///
/// Revocation is one-way. A key that does not exist and a key owned by
/// someone else are both reported as not found.
async fn revoke_api_key(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<RevokeApiKeyResponse>, AppError> {
    let key_id = Uuid::parse_str(&id)
        .map_err(|_| AppError::validation("invalid_key_id", "Invalid API key ID"))?;

    let user = require_user(&state, &auth_user.email).await?;

    let revoked = ApiKeyRepository::new(&state.db)
        .revoke(user.id, key_id)
        .await
        .map_err(|e| {
            error!("Failed to revoke API key {}: {}", key_id, e);
            AppError::internal("Failed to revoke API key")
        })?;

    if revoked {
        info!(email = %auth_user.email, key_id = %key_id, "API key revoked");
        Ok(Json(RevokeApiKeyResponse {
            success: true,
            message: "API key revoked".to_string(),
        }))
    } else {
        // A missing key and someone else's key answer identically
        Err(AppError::not_found("API key not found"))
    }
}
