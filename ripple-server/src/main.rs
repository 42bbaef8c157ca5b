use std::sync::Arc;

use ripple_server::gateway::handle_connection;
use ripple_server::{AppState, Config, Database};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // It's not fatal if .env doesn't exist
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let db = match Database::open(&config.db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database at {}: {}", config.db_path, e);
            std::process::exit(1);
        }
    };
    info!("Database ready at {}", config.db_path);

    let state = Arc::new(AppState::new(config.clone(), db));

    // WebSocket listener
    let ws_listener = match TcpListener::bind(&config.ws_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind websocket listener to {}: {}", config.ws_addr, e);
            std::process::exit(1);
        }
    };
    info!("Realtime gateway listening on {}", config.ws_addr);

    let ws_state = state.clone();
    let gateway_task = tokio::spawn(async move {
        loop {
            match ws_listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let state = ws_state.clone();
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws_stream) => {
                                handle_connection(ws_stream, state).await;
                            }
                            Err(e) => {
                                error!("WebSocket handshake failed for {}: {}", peer_addr, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    });

    // HTTP listener
    let http_listener = match TcpListener::bind(&config.http_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind HTTP listener to {}: {}", config.http_addr, e);
            std::process::exit(1);
        }
    };
    info!("HTTP API listening on {}", config.http_addr);

    let app = ripple_server::http::router(state);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        res = axum::serve(http_listener, app) => {
            if let Err(e) = res {
                error!("HTTP server stopped with error: {}", e);
            }
        }
        _ = gateway_task => {
            error!("Gateway task finished unexpectedly");
        }
    }
}
