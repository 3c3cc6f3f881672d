mod analysis;
mod config;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::session::SessionStore;
use crate::analysis::storage::VideoStorage;
use crate::config::Config;
use crate::llm_client::GeminiClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (a missing API key aborts startup)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Interview Analyzer v{}", env!("CARGO_PKG_VERSION"));

    // Per-session upload directory
    let storage = VideoStorage::new(&config.upload_dir);
    storage
        .ensure_root()
        .await
        .with_context(|| format!("Cannot create upload directory {}", storage.root().display()))?;
    info!("Storing uploads under {}", storage.root().display());

    // Initialize Gemini client
    let model = GeminiClient::new(config.gemini_api_key.clone())?;
    info!("Gemini client initialized (model: {})", llm_client::MODEL);

    let state = AppState {
        config: config.clone(),
        model: Arc::new(model),
        sessions: SessionStore::new(),
        storage,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
