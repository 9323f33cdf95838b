use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use ideaforge_server::auth::{self, TokenVerifier};
use ideaforge_server::config::{generate_config_template, Config};
use ideaforge_server::db::Database;
use ideaforge_server::realtime::Realtime;
use ideaforge_server::routes;
use ideaforge_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ideaforge_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("IdeaForge server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.data_dir)?;

    // Shared secret from config, else a 256-bit key kept in data_dir
    let secret = match &config.jwt_secret {
        Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
        _ => auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?,
    };

    let settings = config.realtime_settings();
    let app_state = AppState::new(db, TokenVerifier::new(&secret), settings);
    let realtime = app_state.realtime.clone();
    let liveness = realtime.spawn_liveness();
    tracing::info!(
        heartbeat_secs = settings.heartbeat_interval.as_secs(),
        write_timeout_ms = settings.write_timeout.as_millis() as u64,
        "Liveness monitor started"
    );

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(realtime.clone()))
    .await?;

    // Idempotent; covers a serve loop that ended without the signal
    realtime.shutdown().await;
    if let Err(e) = liveness.await {
        tracing::warn!(error = %e, "Liveness monitor ended abnormally");
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after draining every live session.
/// Open SSE streams end on their close frame, which lets the serve loop finish.
async fn shutdown_signal(realtime: Arc<Realtime>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining sessions");
    realtime.shutdown().await;
}
