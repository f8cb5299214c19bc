use std::net::SocketAddr;
use std::path::PathBuf;

use loopdesk::config::{load_config, validate_config};
use loopdesk::{mailer_from_config, AppConfig, Loopdesk};
use loopdesk_server::auth::jwt::JwtKeys;
use loopdesk_server::telemetry::init_tracing;
use loopdesk_server::{build_router, AppState};

/// Config file from `LOOPDESK_CONFIG`, the first argument, or
/// `~/.loopdesk/config.json` when it exists.
fn config_path() -> Option<PathBuf> {
    std::env::var_os("LOOPDESK_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from))
        .or_else(|| default_config_path().filter(|p| p.exists()))
}

fn default_config_path() -> Option<PathBuf> {
    loopdesk::db::default_database_path()
        .and_then(|db| db.parent().map(|dir| dir.join("config.json")))
}

fn load() -> AppConfig {
    let mut config = match config_path() {
        Some(path) => load_config(&path)
            .unwrap_or_else(|e| panic!("Failed to load config {}: {e}", path.display())),
        None => AppConfig::default(),
    };
    config
        .apply_env()
        .expect("Invalid configuration environment variable");
    validate_config(&config).expect("Invalid configuration");
    config
}

#[tokio::main]
async fn main() {
    let config = load();
    init_tracing(config.server.log_format);
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Loaded server configuration"
    );

    let secret = config
        .auth
        .resolve_jwt_secret()
        .expect("A JWT secret is required (auth.jwt_secret or JWT_SECRET)");

    let mailer = mailer_from_config(&config).expect("Failed to configure mailer");
    let app = Loopdesk::from_config(&config, mailer).expect("Failed to open loopdesk data");
    tracing::info!("Database and upload directories ready");

    let state = AppState::new(app, JwtKeys::from_secret(&secret));
    let router = build_router(state, &config.server, &config.limits);

    let addr = SocketAddr::new(
        config.server.host.parse().expect("Invalid server.host address"),
        config.server.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
