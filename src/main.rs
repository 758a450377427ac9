//! UniGoods backend server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;

use unigoods_server::app::{build_router, build_state, Stores};
use unigoods_server::config::{Config, StorageBackend};
use unigoods_server::db;
use unigoods_server::middleware::{bucket_janitor, RateLimiter};
use unigoods_server::trade::{expiry_sweeper, release_retrier, TradePolicy};
use unigoods_server::websocket::WsState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        storage = ?config.storage,
        "Starting UniGoods server"
    );

    let stores = match config.storage {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config).await?;
            db::run_migrations(&pool).await?;
            Stores::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            let (stores, users) = Stores::in_memory();
            if let Some(path) = &config.seed_users_file {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path))?;
                let count = users
                    .seed_from_json(&raw)
                    .await
                    .with_context(|| format!("Invalid user seed file {}", path))?;
                tracing::info!(count, "Seeded in-memory user directory");
            }
            stores
        }
    };

    let ws_state = WsState::new();
    let policy = TradePolicy {
        allow_direct_completion: config.allow_direct_completion,
    };
    let app_state = build_state(stores, policy, &config.jwt_secret, ws_state.clone());

    if let Some(ttl_hours) = config.trade_proposal_ttl_hours {
        let trade_service = Arc::clone(&app_state.trade_service);
        let interval = Duration::from_secs(config.trade_expiry_sweep_seconds);
        tokio::spawn(async move {
            expiry_sweeper(
                trade_service,
                ws_state,
                chrono::Duration::hours(ttl_hours),
                interval,
            )
            .await;
        });
    }

    tokio::spawn(release_retrier(
        Arc::clone(&app_state.trade_service),
        Duration::from_secs(config.trade_expiry_sweep_seconds),
    ));

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    tokio::spawn(bucket_janitor(rate_limiter.clone(), Duration::from_secs(300)));

    let app = build_router(app_state, &config, rate_limiter);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("WebSocket available at ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
