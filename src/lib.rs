//! Toolbox API
//!
//! Passwordless magic-link sign-in, API key management, and a tool dispatch
//! endpoint whose first tool fetches web pages and converts them to text or
//! markdown. The binary in `main.rs` is a thin wrapper; everything testable
//! lives here.

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser, Claims};
use services::{EmailService, WebFetchService};

/// Shared state cloned into every handler
#[derive(Clone)]
pub struct AppState {
    /// Parsed configuration, fixed at startup
    pub config: AppConfig,
    /// SQLite pool
    pub db: DbPool,
    /// Web fetch pipeline
    pub webfetch: WebFetchService,
    /// SMTP sender (optional; absent in development)
    pub email: Option<EmailService>,
}
