//! Toolbox API - passwordless auth and web tooling backend
//!
//! This service issues magic-link sign-ins over email, manages long-lived
//! API keys, and exposes a tool dispatch endpoint whose webfetch pipeline
//! retrieves remote pages and converts them to text or markdown.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::Layer, prelude::*, EnvFilter, Registry};

use config::{LogFormat, LogTarget};
use toolbox_api::{
    api, config, db, middleware, services::EmailService, services::WebFetchService, AppConfig,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("Toolbox API {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--init-config") {
        let path = PathBuf::from("config.yaml");
        AppConfig::create_default_config(&path).context("Failed to write default config")?;
        println!("Wrote default configuration to {:?}", path);
        return Ok(());
    }

    // Config before logging: the subscriber setup depends on it
    let config = AppConfig::load().context("Configuration load failed")?;

    // Held until exit so buffered file logs get flushed
    let _log_guard = init_tracing(&config);

    info!("Toolbox API starting up");

    ensure_sqlite_dir(&config)?;

    info!("Connecting to the database");
    let db = db::init_pool(&config.database)
        .await
        .context("Database initialization failed")?;

    let webfetch =
        WebFetchService::new(config.fetch.clone()).context("Failed to build fetch client")?;

    // SMTP is optional: development mode returns magic links in the response
    let email = match &config.email {
        Some(email_config) => {
            info!("Initializing SMTP transport: {}", email_config.smtp_host);
            Some(EmailService::new(email_config).context("Failed to initialize SMTP transport")?)
        }
        None => {
            info!("SMTP not configured, magic-link email delivery disabled");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        db,
        webfetch,
        email,
    };

    let app = build_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}

/// A format/target-specific logging layer, type-erased for composition
type LogLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the logging/tracing infrastructure
///
/// Returns the appender guard when file logging is active; dropping it stops
/// the background writer, so it must live as long as the process.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let logging = &config.logging;
    let mut layers: Vec<LogLayer> = Vec::new();
    let mut guard = None;

    if matches!(logging.target, LogTarget::Console | LogTarget::Both) {
        layers.push(stdout_layer(&logging.format));
    }

    if matches!(logging.target, LogTarget::File | LogTarget::Both) {
        let (writer, worker_guard) = file_writer(logging);
        layers.push(file_layer(&logging.format, writer));
        guard = Some(worker_guard);
    }

    // RUST_LOG wins over the configured level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    guard
}

fn stdout_layer(format: &LogFormat) -> LogLayer {
    match format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).with_thread_ids(false).boxed(),
    }
}

fn file_layer(format: &LogFormat, writer: tracing_appender::non_blocking::NonBlocking) -> LogLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
    }
}

/// Create the non-blocking log file writer, with optional daily rotation
fn file_writer(
    logging: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&logging.log_dir) {
        eprintln!("Warning: could not create log directory {:?}: {}", logging.log_dir, e);
    }

    let appender = if logging.daily_rotation {
        tracing_appender::rolling::daily(&logging.log_dir, &logging.log_prefix)
    } else {
        tracing_appender::rolling::never(&logging.log_dir, &logging.log_prefix)
    };

    tracing_appender::non_blocking(appender)
}

/// Ensure the directory holding the SQLite file exists
fn ensure_sqlite_dir(config: &AppConfig) -> Result<()> {
    let Some(rest) = config.database.url.strip_prefix("sqlite://") else {
        return Ok(());
    };

    // Drop connection options like ?mode=rwc before treating it as a path
    let file = Path::new(rest.split('?').next().unwrap_or(rest));
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Could not create data directory")?;
            info!(path = ?parent, "Created data directory");
        }
    }
    Ok(())
}

/// Assemble the router stack: API routes, optional static assets, outer layers
fn build_router(state: AppState, config: &AppConfig) -> Router {
    // CORS is permissive; the API is token-authenticated and the frontend may
    // be served from another origin during development
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Stricter per-IP limits on the magic-link endpoint (email flood protection)
    let auth_rate_limit = middleware::RateLimitState::new(middleware::RateLimitConfig::for_auth(
        &config.rate_limit,
    ));
    middleware::rate_limit::spawn_rate_limit_cleanup(auth_rate_limit.clone());

    // Authentication must not be applied globally, otherwise public endpoints
    // like /api/auth/request-magic-link become unusable. Public routes stay
    // unauthenticated; auth middleware wraps only the protected routes.
    let api = Router::new()
        .nest("/api", api::public_routes(auth_rate_limit))
        .nest(
            "/api",
            api::protected_routes().layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::auth_middleware,
            )),
        )
        .with_state(state);

    // Optionally serve the bundled frontend pages (login, dashboard)
    let router = if let Some(ref static_dir) = config.server.static_dir {
        if static_dir.exists() {
            info!("Serving static assets from {:?}", static_dir);
            let index_file = static_dir.join("index.html");
            if index_file.exists() {
                let serve_dir =
                    ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));
                api.fallback_service(serve_dir)
            } else {
                warn!(path = ?static_dir, "index.html missing, page fallback disabled");
                api.fallback_service(ServeDir::new(static_dir))
            }
        } else {
            warn!(path = ?static_dir, "Static directory does not exist, assets not served");
            api
        }
    } else {
        info!("No static directory configured");
        api
    };

    router.layer(CompressionLayer::new()).layer(trace).layer(cors)
}

fn print_help() {
    println!(
        r#"Toolbox API {}

USAGE:
    toolbox-api [OPTIONS]

OPTIONS:
    -h, --help          Print this help message
    -V, --version       Print version information
    --init-config       Write a default config.yaml to the current directory

ENVIRONMENT:
    TOOLBOX_CONFIG      Path to configuration file (default: config.yaml)
    PORT                Listen port override
    DATABASE_URL        SQLite database URL override
    JWT_SECRET          Session token signing secret (required in production)

CONFIGURATION:
    The first existing file wins:
        $TOOLBOX_CONFIG (when set)
        ./config.yaml
        ./config/config.yaml
        /etc/toolbox-api/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
