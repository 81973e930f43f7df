//! Guessr Backend Service
//!
//! Main entry point for the BTC guessing game backend.
//! This service provides:
//! - WebSocket API for the player session operations
//! - Background price polling onto the `ticker` channel
//! - Automatic resolution of guesses once their cooldown has passed

use guessr_backend::config::AppConfig;
use guessr_backend::database::{create_pool, run_migrations};
use guessr_backend::error::{AppError, AppResult};
use guessr_backend::price_source::{BinanceTicker, PriceSource};
use guessr_backend::repositories::{InMemoryPlayerRepository, PlayerRepository, PlayerStore};
use guessr_backend::services::{PricePoller, ResolutionScheduler};
use guessr_backend::websocket::WebSocketServer;
use guessr_backend::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("guessr_backend={},sqlx=warn", config.log_level).into()
    });

    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_store(config: &AppConfig) -> AppResult<Arc<dyn PlayerStore>> {
    let Some(db_config) = &config.database else {
        warn!("DATABASE_URL not set - players are kept in memory only");
        return Ok(Arc::new(InMemoryPlayerRepository::new()));
    };

    info!("Connecting to database...");
    let pool = create_pool(db_config).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;
    info!("Max connections: {}", db_config.max_connections);

    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;
    info!("Database migrations completed successfully");

    Ok(Arc::new(PlayerRepository::new(pool)))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    init_tracing(&config);

    info!("Guessr backend starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("WebSocket port: {}", config.ws_port);

    // =========================================================================
    // CORE SERVICES
    // =========================================================================
    let store = build_store(&config).await?;

    let ticker = BinanceTicker::new(&config.ticker)?;
    info!("Price source: {}", ticker.url());
    let prices: Arc<dyn PriceSource> = Arc::new(ticker);

    let app_state = AppState::new(store, prices.clone());
    info!("✓ Guess engine initialized");

    let mut ws_server = WebSocketServer::new(app_state.session.clone());

    let scheduler = if config.auto_resolve {
        let scheduler = Arc::new(ResolutionScheduler::new(app_state.engine.clone()));
        ws_server = ws_server.with_scheduler(scheduler.clone());
        info!("✓ Automatic resolution enabled");
        Some(scheduler)
    } else {
        info!("Automatic resolution disabled - clients resolve their own guesses");
        None
    };

    let ws_server = Arc::new(ws_server);

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let poller = PricePoller::new(prices, ws_server.clone())
        .with_poll_interval(config.ticker.poll_interval());
    let poller_handle = tokio::spawn(async move {
        poller.start().await;
    });
    info!(
        "✓ Price poller started ({:?} interval)",
        config.ticker.poll_interval()
    );

    let notices_handle = scheduler.map(|scheduler| {
        let mut notices = scheduler.subscribe();
        let ws = ws_server.clone();
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(notice) => {
                        ws.broadcast_guess_resolved(notice).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} resolution notices", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    });

    // =========================================================================
    // WEBSOCKET SERVER
    // =========================================================================
    let ws_addr: SocketAddr = format!("0.0.0.0:{}", config.ws_port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid WebSocket address: {}", e)))?;

    let listener = TcpListener::bind(ws_addr)
        .await
        .map_err(|e| AppError::Message(format!("Failed to bind WebSocket server: {}", e)))?;

    let ws = ws_server.clone();
    let ws_handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New WebSocket connection from {}", addr);
                    let ws = ws.clone();
                    tokio::spawn(async move {
                        if let Err(e) = ws.handle_connection(stream).await {
                            error!("WebSocket connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("WebSocket accept error: {}", e);
                }
            }
        }
    });

    info!("✓ WebSocket server listening on {}", ws_addr);
    info!("Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = ws_handle => {
            error!("WebSocket server exited unexpectedly");
        }
        _ = poller_handle => {
            error!("Price poller exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = notices_handle {
                handle.await.ok();
            } else {
                // Never completes if auto-resolve is off
                futures::future::pending::<()>().await;
            }
        } => {
            error!("Resolution notice forwarder exited unexpectedly");
        }
    }

    info!("Guessr backend shutdown complete");
    Ok(())
}
