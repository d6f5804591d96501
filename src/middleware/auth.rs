//! Authentication middleware
//!
//! Accepts either a session JWT (issued after a magic-link login) or an API
//! key. Credentials are looked for in three places, in order: the
//! `Authorization: Bearer` header, the `session_token` cookie, and a `token`
//! field in a JSON request body. The first source that is present wins; later
//! sources are not consulted even when the credential fails.

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::ApiKeyRepository, services::AuthService, utils::error::ErrorResponse, utils::AppError,
    AppState,
};

/// Name of the browser session cookie
pub const SESSION_COOKIE: &str = "session_token";

/// Cap on buffered request bodies when looking for a body token.
///
/// Matches axum's default request body limit, so the buffering step never
/// rejects a body the JSON extractor would have accepted.
const BODY_TOKEN_LIMIT: usize = 2 * 1024 * 1024;

/// JWT claims for a browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User email, the sole identity carried by a session
    pub email: String,
    /// Unix seconds the token was minted
    pub iat: i64,
    /// Unix seconds the token stops being accepted
    pub exp: i64,
}

/// Authenticated identity injected into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
}

/// Lets handlers take AuthUser as a parameter once the middleware has run
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthUser>() {
            Some(user) => Ok(user.clone()),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Authentication required", "unauthorized")),
            )),
        }
    }
}

/// Authentication error types
#[derive(Debug, PartialEq)]
pub enum AuthError {
    InvalidToken,
    TokenExpired,
}

/// Mint a signed session JWT for the given email
pub fn create_session_token(
    email: &str,
    secret: &str,
    ttl_hours: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let issued = Utc::now();
    let expires = issued + Duration::hours(ttl_hours as i64);
    let claims = Claims {
        email: email.to_string(),
        iat: issued.timestamp(),
        exp: expires.timestamp(),
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key)
}

/// Validate and decode a session JWT
pub fn validate_session_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    match decode::<Claims>(token, &key, &Validation::default()) {
        Ok(data) => Ok(data.claims),
        Err(e) if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) => {
            Err(AuthError::TokenExpired)
        }
        Err(_) => Err(AuthError::InvalidToken),
    }
}

/// Pull the token out of an Authorization header; the scheme is
/// case-insensitive
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let (scheme, rest) = auth_header.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(rest)
}

fn parse_api_key(token: &str) -> Option<(Uuid, &str)> {
    // Keys look like tbx_<uuid>_<secret>
    let rest = token.strip_prefix("tbx_")?;
    match rest.split_once('_') {
        Some((id, secret)) if !secret.is_empty() => Some((Uuid::parse_str(id).ok()?, secret)),
        _ => None,
    }
}

/// Pull a `token` field out of a buffered JSON request body
fn extract_body_token(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("token")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(String::from)
}

async fn authenticate_api_key(state: &AppState, token: &str) -> Result<AuthUser, AuthError> {
    let (key_id, secret) = parse_api_key(token).ok_or(AuthError::InvalidToken)?;

    let repo = ApiKeyRepository::new(&state.db);
    let auth = repo
        .find_auth_data(key_id)
        .await
        .map_err(|_| AuthError::InvalidToken)?
        .ok_or(AuthError::InvalidToken)?;

    if auth.revoked {
        return Err(AuthError::InvalidToken);
    }

    let verified = AuthService::verify_secret(secret, &auth.key_hash)
        .map_err(|_| AuthError::InvalidToken)?;
    if !verified {
        return Err(AuthError::InvalidToken);
    }

    // Best-effort usage tracking, off the request path
    let pool = state.db.clone();
    tokio::spawn(async move {
        let _ = ApiKeyRepository::new(&pool).touch_last_used(key_id).await;
    });

    Ok(AuthUser { email: auth.email })
}

enum AuthAttempt {
    Authenticated(AuthUser),
    Rejected,
    Missing,
}

/// Try a raw credential as a session JWT first, then as an API key
async fn try_credential(state: &AppState, credential: &str) -> AuthAttempt {
    if let Ok(claims) = validate_session_token(credential, &state.config.auth.jwt_secret) {
        return AuthAttempt::Authenticated(AuthUser {
            email: claims.email,
        });
    }

    match authenticate_api_key(state, credential).await {
        Ok(user) => AuthAttempt::Authenticated(user),
        Err(_) => AuthAttempt::Rejected,
    }
}

/// Locate and verify a credential, preserving the request body.
///
/// Returns the (possibly rebuilt) request so the downstream handler can still
/// read the body after it was buffered here.
async fn authenticate_request(state: &AppState, request: Request) -> (Request, AuthAttempt) {
    // 1. Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty());

    if let Some(value) = auth_header {
        let credential = extract_bearer_token(value).unwrap_or(value).to_string();
        let attempt = try_credential(state, &credential).await;
        return (request, attempt);
    }

    // 2. Session cookie (browser flows); only ever a JWT
    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            let attempt =
                match validate_session_token(cookie.value(), &state.config.auth.jwt_secret) {
                Ok(claims) => AuthAttempt::Authenticated(AuthUser {
                    email: claims.email,
                }),
                Err(_) => AuthAttempt::Rejected,
            };
            return (request, attempt);
        }
    }

    // 3. `token` field in a JSON body; buffer and replay so the handler can
    // still deserialize the payload
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, BODY_TOKEN_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let request = Request::from_parts(parts, Body::empty());
            return (request, AuthAttempt::Missing);
        }
    };

    let attempt = match extract_body_token(&bytes) {
        Some(token) => try_credential(state, &token).await,
        None => AuthAttempt::Missing,
    };

    let request = Request::from_parts(parts, Body::from(bytes));
    (request, attempt)
}

/// Authentication middleware
///
/// On success the AuthUser is injected into request extensions; on failure a
/// 401 envelope with a login redirect hint is returned.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let redirect = format!(
        "/login?redirect={}",
        urlencoding::encode(request.uri().path())
    );

    let (mut request, attempt) = authenticate_request(&state, request).await;

    match attempt {
        AuthAttempt::Authenticated(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        AuthAttempt::Rejected => Err(AppError::unauthorized_with_redirect(
            "invalid_token",
            "Invalid or expired token",
            redirect,
        )),
        AuthAttempt::Missing => Err(AppError::unauthorized_with_redirect(
            "unauthorized",
            "Authentication required",
            redirect,
        )),
    }
}
