//! Health check endpoints
//!
//! The basic check answers load balancers with a database ping; the detailed
//! variant reports per-component status for operators.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{db, AppState};

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Operator-facing health report broken down by component
#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub components: ComponentHealth,
}

/// Per-component status block
#[derive(Serialize)]
pub struct ComponentHealth {
    pub database: ComponentStatus,
    pub email: ComponentStatus,
}

/// Condition of one backing component
///
/// Serializes flat: `{"status": "...", "message"?: "..."}`.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentStatus {
    Healthy,
    Unhealthy { message: String },
    NotConfigured,
}

impl ComponentStatus {
    /// An absent optional component does not degrade the service
    fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy { .. })
    }
}

/// Simple health check endpoint (for load balancers)
///
/// Pings the database and returns 503 when it does not answer.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    basic_response(db::check_health(&state.db).await.is_ok())
}

fn basic_response(db_ok: bool) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status) = if db_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Detailed health check endpoint
///
/// Probes the database and the SMTP relay; 503 unless every configured
/// component answers.
pub async fn health_check_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let database = match db::check_health(&state.db).await {
        Ok(_) => ComponentStatus::Healthy,
        Err(e) => ComponentStatus::Unhealthy {
            message: e.to_string(),
        },
    };

    // SMTP is optional; development deployments run without it
    let email = match &state.email {
        Some(email_service) => match email_service.check_connection().await {
            Ok(true) => ComponentStatus::Healthy,
            Ok(false) => ComponentStatus::Unhealthy {
                message: "SMTP relay refused connection test".to_string(),
            },
            Err(e) => ComponentStatus::Unhealthy {
                message: e.to_string(),
            },
        },
        None => ComponentStatus::NotConfigured,
    };

    let healthy = database.is_operational() && email.is_operational();

    (
        if healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Json(DetailedHealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            components: ComponentHealth { database, email },
        }),
    )
}

/// Liveness probe (for Kubernetes)
///
/// Answers 200 whenever the process is running at all.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (for Kubernetes)
///
/// Ready means the database answers; nothing works without it.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match db::check_health(&state.db).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
