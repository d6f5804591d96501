//! Magic-link authentication flow tests
//!
//! Exercises the full passwordless sign-in lifecycle: requesting a link in
//! development mode, consuming it, session cookies, and logout.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::common::TestApp;

/// Pull the raw token out of a magic link URL
fn token_from_link(link: &str) -> String {
    link.split("token=")
        .nth(1)
        .expect("magic link carries no token")
        .to_string()
}

async fn request_magic_token(app: &TestApp, email: &str) -> String {
    let response = app
        .post_json("/api/auth/request-magic-link", json!({ "email": email }))
        .await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["success"], true);
    token_from_link(json["magic_link"].as_str().expect("development mode returns the link"))
}

#[tokio::test]
async fn test_magic_link_returned_in_development_mode() {
    let app = TestApp::new().await;
    let response = app
        .post_json(
            "/api/auth/request-magic-link",
            json!({ "email": "alice@example.com" }),
        )
        .await;

    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["success"], true);
    let link = json["magic_link"].as_str().unwrap();
    assert!(link.contains("/api/auth/validate?token="));
    // Tokens are 32 random bytes, hex encoded
    assert_eq!(token_from_link(link).len(), 64);
}

#[tokio::test]
async fn test_magic_link_requires_email() {
    let app = TestApp::new().await;

    let response = app.post_json("/api/auth/request-magic-link", json!({})).await;
    response.assert_bad_request().assert_error_code("missing_email");

    let response = app
        .post_json(
            "/api/auth/request-magic-link",
            json!({ "email": "not-an-address" }),
        )
        .await;
    response.assert_bad_request().assert_error_code("invalid_email");
}

#[tokio::test]
async fn test_validate_sets_session_cookie() {
    let app = TestApp::new().await;
    let token = request_magic_token(&app, "bob@example.com").await;

    let response = app
        .get(&format!("/api/auth/validate?token={}", token))
        .await;
    response.assert_ok();

    let cookie = response
        .header("set-cookie")
        .expect("validation sets the session cookie");
    assert!(cookie.starts_with("session_token="));
    assert!(cookie.contains("HttpOnly"));

    // The interstitial page forwards the browser to the dashboard
    assert!(response.text().contains("/dash"));
}

#[tokio::test]
async fn test_magic_token_is_single_use() {
    let app = TestApp::new().await;
    let token = request_magic_token(&app, "carol@example.com").await;

    app.get(&format!("/api/auth/validate?token={}", token))
        .await
        .assert_ok();

    // Second consumption fails with the uniform error
    app.get(&format!("/api/auth/validate?token={}", token))
        .await
        .assert_bad_request()
        .assert_error_code("invalid_token");
}

#[tokio::test]
async fn test_new_magic_link_invalidates_previous() {
    let app = TestApp::new().await;
    let first = request_magic_token(&app, "dave@example.com").await;
    let second = request_magic_token(&app, "dave@example.com").await;

    app.get(&format!("/api/auth/validate?token={}", first))
        .await
        .assert_bad_request()
        .assert_error_code("invalid_token");

    app.get(&format!("/api/auth/validate?token={}", second))
        .await
        .assert_ok();
}

#[tokio::test]
async fn test_validate_requires_token_param() {
    let app = TestApp::new().await;

    app.get("/api/auth/validate")
        .await
        .assert_bad_request()
        .assert_error_code("missing_token");

    app.get("/api/auth/validate?token=")
        .await
        .assert_bad_request()
        .assert_error_code("missing_token");
}

#[tokio::test]
async fn test_unknown_token_rejected_uniformly() {
    let app = TestApp::new().await;

    app.get(&format!("/api/auth/validate?token={}", "ab".repeat(32)))
        .await
        .assert_bad_request()
        .assert_error_code("invalid_token");
}

#[tokio::test]
async fn test_expired_token_rejected_and_burned() {
    let app = TestApp::new().await;

    // Seed a token that expired two hours ago
    let user_id = Uuid::new_v4();
    let token = "cd".repeat(32);
    sqlx::query("INSERT INTO users (id, email) VALUES (?, ?)")
        .bind(user_id.to_string())
        .bind("expired@example.com")
        .execute(&app.state.db)
        .await
        .unwrap();
    sqlx::query("INSERT INTO magic_tokens (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id.to_string())
        .bind((Utc::now() - chrono::Duration::hours(2)).to_rfc3339())
        .execute(&app.state.db)
        .await
        .unwrap();

    // Expired and unknown tokens are indistinguishable to the caller
    app.get(&format!("/api/auth/validate?token={}", token))
        .await
        .assert_bad_request()
        .assert_error_code("invalid_token");

    // The attempt burned the token; it stays invalid
    app.get(&format!("/api/auth/validate?token={}", token))
        .await
        .assert_bad_request()
        .assert_error_code("invalid_token");
}

#[tokio::test]
async fn test_email_normalized_before_account_creation() {
    let app = TestApp::new().await;
    let token = request_magic_token(&app, "  Erin@Example.COM  ").await;

    app.get(&format!("/api/auth/validate?token={}", token))
        .await
        .assert_ok();

    let session = app.session_token_for("erin@example.com");
    let response = app.get_with_auth("/api/auth/me", &session).await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["email"], "erin@example.com");
}

#[tokio::test]
async fn test_repeat_login_reuses_account() {
    let app = TestApp::new().await;
    request_magic_token(&app, "returning@example.com").await;
    request_magic_token(&app, "returning@example.com").await;

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind("returning@example.com")
        .fetch_one(&app.state.db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_bearer_outranks_cookie_identity() {
    let app = TestApp::new().await;
    let header_session = app.session_token_for("header@example.com");
    let cookie_session = app.session_token_for("cookie@example.com");

    let response = app
        .request(
            axum::http::Request::builder()
                .method("GET")
                .uri("/api/auth/me")
                .header("Authorization", format!("Bearer {}", header_session))
                .header("Cookie", format!("session_token={}", cookie_session))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["email"], "header@example.com");
}

#[tokio::test]
async fn test_me_returns_authenticated_email() {
    let app = TestApp::new().await;
    let session = app.session_token_for("frank@example.com");

    let response = app.get_with_auth("/api/auth/me", &session).await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["email"], "frank@example.com");
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = TestApp::new().await;

    let response = app.get("/api/auth/me").await;
    response.assert_unauthorized().assert_error_code("unauthorized");

    let json: serde_json::Value = response.json();
    let redirect = json["redirect"].as_str().unwrap();
    assert!(redirect.starts_with("/login?redirect="));
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let app = TestApp::new().await;
    let session = app.session_token_for("grace@example.com");

    let response = app.get_with_cookie("/api/auth/me", &session).await;
    response.assert_ok();

    let json: serde_json::Value = response.json();
    assert_eq!(json["email"], "grace@example.com");
}

#[tokio::test]
async fn test_garbage_bearer_token_rejected() {
    let app = TestApp::new().await;

    app.get_with_auth("/api/auth/me", "definitely-not-a-credential")
        .await
        .assert_unauthorized()
        .assert_error_code("invalid_token");
}

#[tokio::test]
async fn test_logout_clears_session_cookie() {
    let app = TestApp::new().await;

    let response = app.get("/api/auth/logout").await;
    response.assert_status(axum::http::StatusCode::SEE_OTHER);

    let cookie = response.header("set-cookie").expect("logout clears the cookie");
    assert!(cookie.starts_with("session_token=;"));
    assert!(cookie.contains("Max-Age=0"));
    assert_eq!(response.header("location").as_deref(), Some("/"));
}

#[tokio::test]
async fn test_magic_link_endpoint_rate_limited() {
    let app = TestApp::new().await;

    // Burst of 5 allowed per IP, the sixth is throttled
    for _ in 0..5 {
        app.post_json(
            "/api/auth/request-magic-link",
            json!({ "email": "heidi@example.com" }),
        )
        .await
        .assert_ok();
    }

    let response = app
        .post_json(
            "/api/auth/request-magic-link",
            json!({ "email": "heidi@example.com" }),
        )
        .await;
    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.header("retry-after").as_deref(), Some("1"));
}
