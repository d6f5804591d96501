//! Authentication API endpoints
//!
//! Passwordless flow: the client requests a magic link by email, follows the
//! link to mint a session JWT (also set as a cookie), and can inspect the
//! resulting identity via `/me`.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::header,
    response::{AppendHeaders, Html, IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, error, info};
use validator::ValidateEmail;

use crate::{
    db::ConsumeResult,
    middleware::auth::{create_session_token, SESSION_COOKIE},
    middleware::{rate_limit_middleware, AuthUser, RateLimitState},
    models::{MagicLinkRequest, MagicLinkResponse, MeResponse},
    services::AuthService,
    utils::AppError,
    AppState,
};

/// Create public routes for authentication endpoints (no auth required)
///
/// The magic-link endpoint gets its own per-IP rate limit so a scripted
/// caller cannot flood outbound email.
pub fn public_routes(auth_rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/request-magic-link",
            post(request_magic_link).layer(axum::middleware::from_fn_with_state(
                auth_rate_limit,
                rate_limit_middleware,
            )),
        )
        .route("/validate", get(validate_magic_link))
        .route("/logout", get(logout))
}

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_current_user))
}

fn session_cookie_header(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    // Secure only outside development so plain-HTTP local setups keep working
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie_header(secure: bool) -> String {
    session_cookie_header("", 0, secure)
}

/// Interstitial page served after a successful magic-link validation.
///
/// Browser clients keep the session cookie; the inline script also stores the
/// JWT for API calls and forwards to the dashboard.
fn login_success_page(token: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Signing in...</title></head>
<body>
<p>Signing you in...</p>
<script>
localStorage.setItem('{SESSION_COOKIE}', '{token}');
window.location.href = '/dash';
</script>
</body>
</html>
"#
    )
}

/// Magic link request handler
///
/// POST /api/auth/request-magic-link
async fn request_magic_link(
    State(state): State<AppState>,
    payload: Result<Json<MagicLinkRequest>, JsonRejection>,
) -> Result<Json<MagicLinkResponse>, AppError> {
    let Json(payload) = payload.map_err(|e| {
        AppError::validation("invalid_request_body", format!("Invalid request body: {}", e))
    })?;

    let email = AuthService::normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::validation(
            "missing_email",
            "The 'email' field is required",
        ));
    }
    if !email.validate_email() {
        return Err(AppError::validation(
            "invalid_email",
            "Invalid email address",
        ));
    }

    let ttl_hours = state.config.auth.magic_token_ttl_hours;
    let auth_service = AuthService::new(state.db.clone());
    let (user, token) = auth_service
        .request_magic_link(&email, ttl_hours)
        .await
        .map_err(|e| {
            error!("Failed to issue magic token: {}", e);
            AppError::internal("Failed to issue magic link")
        })?;

    let link = format!(
        "{}/api/auth/validate?token={}",
        state.config.server.base_url.trim_end_matches('/'),
        token
    );

    // Development mode skips email delivery and hands the link back directly
    if state.config.server.environment.is_development() {
        debug!(email = %email, "Magic link issued (development mode)");
        return Ok(Json(MagicLinkResponse {
            success: true,
            message: "Magic link generated (development mode)".to_string(),
            magic_link: Some(link),
        }));
    }

    let Some(email_service) = &state.email else {
        error!("SMTP is not configured; cannot deliver magic link");
        return Err(AppError::ServiceUnavailable(
            "Email delivery is not configured".to_string(),
        ));
    };

    email_service
        .send_magic_link(&user.email, &link, ttl_hours)
        .await
        .map_err(|e| {
            error!("Failed to send magic link email: {}", e);
            AppError::internal("Failed to send magic link email")
        })?;

    Ok(Json(MagicLinkResponse {
        success: true,
        message: "Magic link sent to your email".to_string(),
        magic_link: None,
    }))
}

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    token: Option<String>,
}

/// Magic link validation handler
///
/// GET /api/auth/validate?token=...
async fn validate_magic_link(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = query.token.filter(|t| !t.is_empty()).ok_or_else(|| {
        AppError::validation("missing_token", "The 'token' query parameter is required")
    })?;

    let auth_service = AuthService::new(state.db.clone());
    let outcome = auth_service.consume_magic_token(&token).await.map_err(|e| {
        error!("Failed to consume magic token: {}", e);
        AppError::internal("Failed to validate magic link")
    })?;

    let email = match outcome {
        ConsumeResult::Valid { email } => email,
        // Used, expired and unknown tokens are indistinguishable to the caller
        ConsumeResult::Expired | ConsumeResult::NotFound => {
            return Err(AppError::validation(
                "invalid_token",
                "Invalid or expired token",
            ));
        }
    };

    let ttl_hours = state.config.auth.session_ttl_hours;
    let session = create_session_token(&email, &state.config.auth.jwt_secret, ttl_hours)
        .map_err(|e| {
            error!("Failed to create session token: {}", e);
            AppError::internal("Failed to create session")
        })?;

    info!(email = %email, "Magic link validated, session issued");

    let secure = !state.config.server.environment.is_development();
    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            session_cookie_header(&session, ttl_hours * 3600, secure),
        )]),
        Html(login_success_page(&session)),
    ))
}

/// Logout handler
///
/// GET /api/auth/logout
///
/// Sessions are stateless JWTs; logout just clears the cookie.
async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let secure = !state.config.server.environment.is_development();
    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie_header(secure))]),
        Redirect::to("/"),
    )
}

/// Current user handler
///
/// GET /api/auth/me
async fn get_current_user(auth_user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        email: auth_user.email,
    })
}
