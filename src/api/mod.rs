//! Route tables
//!
//! Handlers live in the per-resource submodules; this file only decides
//! which paths exist and which of them sit behind the credential check.

use axum::{routing::get, Router};

use crate::middleware::{auth_middleware, RateLimitConfig, RateLimitState};
use crate::AppState;

mod api_keys;
mod auth;
mod health;
mod tool;

pub use health::*;

/// Routes reachable without a credential
pub fn public_routes(auth_rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Login endpoints throttle per client IP before doing any work
        .nest("/auth", auth::public_routes(auth_rate_limit))
}

/// Routes that require a session or API key
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::protected_routes())
        .nest("/keys", api_keys::routes())
        .merge(tool::routes())
}

/// Assemble both tables, with the auth middleware wrapped around the protected one
pub fn routes(state: AppState) -> Router<AppState> {
    let auth_rate_limit = RateLimitState::new(RateLimitConfig::for_auth(&state.config.rate_limit));
    public_routes(auth_rate_limit).merge(
        protected_routes().layer(axum::middleware::from_fn_with_state(state, auth_middleware)),
    )
}
