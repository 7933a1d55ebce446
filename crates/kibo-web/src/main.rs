//! kibo-web — Axum web server entry point.
//! Loads config and persisted state, starts the companion, and serves the
//! REST API, the event WebSocket, and the widget.

mod bridge;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use kibo_core::config::Config;
use kibo_core::providers::OpenAiProvider;
use kibo_core::storage::JsonDirStore;
use kibo_core::Kibo;

use bridge::{BrowserBridge, ClientAudio};
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let config_path = project_root.join("config.yaml");
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Using default config: {:#}", e);
            Config {
                project_root: project_root.clone(),
                ..Config::default()
            }
        }
    };
    if config.api_key.is_none() {
        warn!("No API key configured; set OPENAI_API_KEY or api_key in config.yaml");
    }

    let data_dir = config.resolve_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
    info!("Persisting state under {}", data_dir.display());

    let provider = OpenAiProvider::new(config.clone()).context("Failed to build AI provider")?;
    let bridge = Arc::new(BrowserBridge::new());
    let kibo = Kibo::new(
        config,
        Arc::new(JsonDirStore::new(data_dir)),
        Arc::new(provider),
        bridge.clone(),
        Arc::new(ClientAudio),
    );
    kibo.start();

    let state = Arc::new(AppState {
        kibo: kibo.clone(),
        bridge,
        project_root,
    });
    let app = server::router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = format!("0.0.0.0:{}", port);

    eprintln!("\n  Kibo is up: open http://localhost:{}\n", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Graceful shutdown on Ctrl+C
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping timers...");
        kibo.shutdown();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    info!("Server stopped.");
    Ok(())
}
