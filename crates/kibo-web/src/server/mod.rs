//! Web server — Axum router + shared state.

pub mod api;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use kibo_core::Kibo;

use crate::bridge::BrowserBridge;

/// Shared application state — one companion and the browser bridge feeding it.
pub struct AppState {
    pub kibo: Kibo,
    pub bridge: Arc<BrowserBridge>,
    pub project_root: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    let mut app = Router::new()
        .merge(api::routes())
        .merge(ws::routes())
        .layer(cors)
        .with_state(state.clone());

    // Serve the widget's static files if they have been built
    let frontend_dist = state.project_root.join("crates/kibo-web/frontend/dist");
    if frontend_dist.is_dir() {
        let index_html = frontend_dist.join("index.html");
        app = app.fallback_service(
            ServeDir::new(&frontend_dist).not_found_service(ServeFile::new(index_html)),
        );
    }

    app
}
