//! Configuration loading and validation
//!
//! Settings come from a YAML file found in one of a few conventional
//! locations, with environment variables layered on top and defaults filling
//! whatever is left. Everything the process needs is assembled here once at
//! startup and passed down explicitly; no component reads the environment on
//! its own.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration tree
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    /// SMTP settings for magic-link delivery (optional; without it only
    /// development mode can complete a magic-link request)
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener and public URL settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::host")]
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// Public base URL used when building magic links
    #[serde(default = "defaults::base_url")]
    pub base_url: String,
    /// Development mode returns magic links in API responses instead of
    /// sending email
    #[serde(default)]
    pub environment: Environment,
    /// Directory of prebuilt dashboard assets served at /
    #[serde(default = "defaults::static_dir")]
    pub static_dir: Option<PathBuf>,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

/// Session and magic-link token settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Lifetime of issued session tokens and the session cookie
    #[serde(default = "defaults::session_ttl")]
    pub session_ttl_hours: u64,
    /// Lifetime of emailed magic-link tokens
    #[serde(default = "defaults::magic_token_ttl")]
    pub magic_token_ttl_hours: u64,
}

/// SQLite pool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection string, e.g. sqlite://./data/toolbox.db
    pub url: String,
    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,
    #[serde(default = "defaults::min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pool connection before giving up
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Seconds an idle connection may sit in the pool
    #[serde(default = "defaults::idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// SMTP configuration for outgoing magic-link mail
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "defaults::smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    /// From address for outgoing mail; falls back to the SMTP username
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default = "defaults::app_name")]
    pub app_name: String,
}

impl EmailConfig {
    /// Effective From address for outgoing messages
    pub fn effective_from(&self) -> &str {
        self.from_address.as_deref().unwrap_or(&self.smtp_username)
    }
}

/// Webfetch tool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Timeout applied when the caller does not specify one
    #[serde(default = "defaults::fetch_timeout")]
    pub default_timeout_secs: u64,
    /// Hard ceiling; caller-supplied timeouts above this are clamped
    #[serde(default = "defaults::fetch_max_timeout")]
    pub max_timeout_secs: u64,
    /// Response body size cap in bytes
    #[serde(default = "defaults::max_response_bytes")]
    pub max_response_bytes: usize,
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

/// Throttling for the unauthenticated auth endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitSettings {
    /// Sustained per-IP request rate on the magic-link endpoint
    #[serde(default = "defaults::auth_rps")]
    pub auth_requests_per_second: u32,
    /// Requests allowed to burst past the sustained rate
    #[serde(default = "defaults::auth_burst")]
    pub auth_burst_size: u32,
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is not set, e.g. "info" or
    /// "toolbox_api=debug"
    #[serde(default = "defaults::log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files when the target includes "file"
    #[serde(default = "defaults::log_dir")]
    pub log_dir: PathBuf,
    /// File name prefix for rotated logs
    #[serde(default = "defaults::log_prefix")]
    pub log_prefix: String,
    /// Rotate the log file daily instead of appending forever
    #[serde(default = "defaults::log_rotation")]
    pub daily_rotation: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Where log lines go
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Stdout only
    #[default]
    Console,
    /// Rotating file under log_dir
    File,
    /// Stdout and file together
    Both,
}

/// Field defaults referenced from the serde attributes above
mod defaults {
    use std::path::PathBuf;

    pub fn host() -> String {
        "127.0.0.1".to_string()
    }

    pub fn port() -> u16 {
        8000
    }

    pub fn base_url() -> String {
        "http://localhost:8000".to_string()
    }

    pub fn static_dir() -> Option<PathBuf> {
        // Serve a static/ directory next to the binary when one exists
        let dir = PathBuf::from("static");
        dir.exists().then_some(dir)
    }

    pub fn session_ttl() -> u64 {
        24
    }

    pub fn magic_token_ttl() -> u64 {
        24
    }

    pub fn max_connections() -> u32 {
        10
    }

    pub fn min_connections() -> u32 {
        1
    }

    pub fn connect_timeout() -> u64 {
        30
    }

    pub fn idle_timeout() -> u64 {
        600
    }

    pub fn smtp_port() -> u16 {
        587
    }

    pub fn app_name() -> String {
        "Toolbox API".to_string()
    }

    pub fn fetch_timeout() -> u64 {
        30
    }

    pub fn fetch_max_timeout() -> u64 {
        120
    }

    pub fn max_response_bytes() -> usize {
        5 * 1024 * 1024
    }

    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
    }

    pub fn auth_rps() -> u32 {
        1
    }

    pub fn auth_burst() -> u32 {
        5
    }

    pub fn log_level() -> String {
        "info".to_string()
    }

    pub fn log_dir() -> PathBuf {
        PathBuf::from("/var/log/toolbox-api")
    }

    pub fn log_prefix() -> String {
        "toolbox-api".to_string()
    }

    pub fn log_rotation() -> bool {
        true
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: defaults::fetch_timeout(),
            max_timeout_secs: defaults::fetch_max_timeout(),
            max_response_bytes: defaults::max_response_bytes(),
            user_agent: defaults::user_agent(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth_requests_per_second: defaults::auth_rps(),
            auth_burst_size: defaults::auth_burst(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: defaults::log_dir(),
            log_prefix: defaults::log_prefix(),
            daily_rotation: defaults::log_rotation(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: defaults::host(),
                port: defaults::port(),
                base_url: defaults::base_url(),
                environment: Environment::default(),
                static_dir: defaults::static_dir(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-to-a-long-random-string".to_string(),
                session_ttl_hours: defaults::session_ttl(),
                magic_token_ttl_hours: defaults::magic_token_ttl(),
            },
            database: DatabaseConfig {
                url: "sqlite://./data/toolbox.db".to_string(),
                max_connections: defaults::max_connections(),
                min_connections: defaults::min_connections(),
                connect_timeout_secs: defaults::connect_timeout(),
                idle_timeout_secs: defaults::idle_timeout(),
            },
            email: None,
            fetch: FetchConfig::default(),
            rate_limit: RateLimitSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Later sources win: defaults, then the YAML file, then environment
    /// variables.
    pub fn load() -> Result<Self> {
        // Pick up a .env file when running from a checkout
        let _ = dotenvy::dotenv();

        let explicit = std::env::var("TOOLBOX_CONFIG").map(PathBuf::from).ok();
        let config_path = explicit.or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(path) if path.exists() => {
                eprintln!("Loading configuration from {:?}", path);
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {path:?}"))?;
                serde_norway::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file {path:?}"))?
            }
            Some(path) => {
                eprintln!("Configured file {:?} does not exist, using defaults", path);
                AppConfig::default()
            }
            None => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Locate a config file in the conventional spots
    fn find_config_file() -> Option<PathBuf> {
        ["config.yaml", "config/config.yaml", "/etc/toolbox-api/config.yaml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Layer environment variables over the loaded file
    fn apply_env_overrides(&mut self) {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok()
        }

        if let Some(host) = env("TOOLBOX_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = env("BASE_URL") {
            self.server.base_url = url;
        }
        if let Some(name) = env("APP_ENV").or_else(|| env("ENV")) {
            if name.eq_ignore_ascii_case("development") {
                self.server.environment = Environment::Development;
            }
        }
        if let Some(dir) = env("TOOLBOX_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }

        if let Some(url) = env("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = env("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        // Setting SMTP_HOST alone is enough to switch email delivery on
        if let Some(host) = env("SMTP_HOST") {
            let email = self.email.get_or_insert_with(|| EmailConfig {
                smtp_host: host.clone(),
                smtp_port: defaults::smtp_port(),
                smtp_username: String::new(),
                smtp_password: String::new(),
                from_address: None,
                app_name: defaults::app_name(),
            });
            email.smtp_host = host;
        }
        if let (Some(port), Some(email)) = (env("SMTP_PORT"), self.email.as_mut()) {
            if let Ok(p) = port.parse() {
                email.smtp_port = p;
            }
        }
        if let (Some(username), Some(email)) = (env("SMTP_USERNAME"), self.email.as_mut()) {
            email.smtp_username = username;
        }
        if let (Some(password), Some(email)) = (env("SMTP_PASSWORD"), self.email.as_mut()) {
            email.smtp_password = password;
        }
        if let (Some(from), Some(email)) = (env("SMTP_FROM"), self.email.as_mut()) {
            email.from_address = Some(from);
        }
        if let (Some(name), Some(email)) = (env("APP_NAME"), self.email.as_mut()) {
            email.app_name = name;
        }

        if let Some(level) = env("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = env("TOOLBOX_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Some(target) = env("TOOLBOX_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Some(dir) = env("TOOLBOX_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
    }

    /// Reject configurations that cannot work before the server starts
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("auth.jwt_secret must be at least 32 characters");
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("database.url is required");
        }

        let base = url::Url::parse(&self.server.base_url)
            .with_context(|| format!("Invalid base_url: {}", self.server.base_url))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            anyhow::bail!("base_url must use http or https");
        }

        if self.fetch.default_timeout_secs == 0 || self.fetch.max_timeout_secs == 0 {
            anyhow::bail!("Fetch timeouts must be greater than 0");
        }
        if self.fetch.default_timeout_secs > self.fetch.max_timeout_secs {
            anyhow::bail!(
                "Fetch default timeout ({}s) exceeds the maximum ({}s)",
                self.fetch.default_timeout_secs,
                self.fetch.max_timeout_secs
            );
        }
        if self.fetch.max_response_bytes == 0 {
            anyhow::bail!("Fetch response size cap must be greater than 0");
        }

        if self.rate_limit.auth_requests_per_second == 0 || self.rate_limit.auth_burst_size == 0 {
            anyhow::bail!("Rate limits must be greater than 0");
        }

        // Warn on production setups that cannot deliver magic links
        if !self.server.environment.is_development() && self.email.is_none() {
            tracing::warn!(
                "No email configuration present; magic-link requests fail outside development"
            );
        }

        if let Some(ref static_dir) = self.server.static_dir {
            if !static_dir.exists() {
                tracing::warn!(
                    path = ?static_dir,
                    "Static directory missing; dashboard will not be served"
                );
            }
        }

        Ok(())
    }

    /// Write a default configuration file, creating parent directories
    pub fn create_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {parent:?}"))?;
        }

        let yaml = serde_norway::to_string(&AppConfig::default())?;
        std::fs::write(path, yaml).with_context(|| format!("Failed to write {path:?}"))
    }
}
