//! Tool dispatch endpoint
//!
//! A single POST /api/tool entry point takes `{"tool": ..., "payload": ...}`
//! and routes the payload to the named tool. Only `webfetch` is wired up;
//! unknown names come back as `unsupported_tool` so clients can distinguish
//! a typo from a transport failure.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    db::ApiKeyRepository,
    middleware::AuthUser,
    services::{FetchRequest, FetchResult},
    utils::AppError,
    AppState,
};

/// Create tool dispatch routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/tool", post(dispatch_tool).fallback(method_not_allowed))
}

/// Tool dispatch handler
///
/// POST /api/tool
async fn dispatch_tool(
    State(state): State<AppState>,
    auth_user: AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<FetchResult>, AppError> {
    // Usage telemetry must never delay or fail the call
    let pool = state.db.clone();
    let email = auth_user.email.clone();
    tokio::spawn(async move {
        if let Err(e) = ApiKeyRepository::new(&pool)
            .touch_last_used_by_email(&email)
            .await
        {
            debug!("Failed to record tool usage for {}: {}", email, e);
        }
    });

    let Json(body) = body.map_err(|e| {
        AppError::validation_with_details(
            "invalid_request",
            "Failed to decode request body",
            Value::String(e.body_text()),
        )
    })?;

    let tool = body
        .get("tool")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if tool.is_empty() {
        return Err(AppError::validation_with_details(
            "missing_required_field",
            "The 'tool' field is required in the request",
            json!({ "field": "tool" }),
        ));
    }

    let payload = body
        .get("payload")
        .cloned()
        .unwrap_or_else(|| json!({}));

    match tool {
        "webfetch" => {
            let request = FetchRequest::from_payload(&payload);
            let result = state.webfetch.fetch(&request).await?;
            Ok(Json(result))
        }
        other => Err(AppError::validation_with_details(
            "unsupported_tool",
            "Unsupported tool",
            json!({ "tool": other }),
        )),
    }
}

/// Non-POST requests to /api/tool get the standard envelope, not a bare 405
async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
