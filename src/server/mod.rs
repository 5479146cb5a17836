// ABOUTME: axum server exposing the chunked import endpoint
// ABOUTME: Builds the router and runs it with a background session sweeper

pub mod auth;
pub mod routes;

use crate::config::ServerConfig;
use crate::import::{
    spawn_sweeper, ChunkProcessor, MemorySessionStore, PgTargetProvider, SessionStore,
};
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ChunkProcessor>,
    pub auth_tokens: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(processor: ChunkProcessor, auth_tokens: Vec<String>) -> Self {
        Self {
            processor: Arc::new(processor),
            auth_tokens: Arc::new(auth_tokens),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Oversized bodies reach the processor so they are reported as a json 400.
    let body_limit = state.processor.max_chunk_bytes().saturating_mul(2);

    Router::new()
        .route("/import", post(routes::upload_chunk))
        .route("/import/:session_id", get(routes::session_progress))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve imports until the process is stopped
pub async fn serve(config: ServerConfig) -> Result<()> {
    let store = Arc::new(MemorySessionStore::new(config.session_ttl()));
    let sweep_every = Duration::from_secs(config.session_ttl_secs.clamp(1, 60));
    spawn_sweeper(store.clone() as Arc<dyn SessionStore>, sweep_every);

    if config.servers.is_empty() {
        tracing::warn!("⚠ No [servers] configured; every import request will be rejected");
    }
    if config.auth_tokens.is_empty() {
        tracing::warn!("⚠ No auth_tokens configured; the import endpoint is unauthenticated");
    }

    let processor = ChunkProcessor::new(
        store,
        Arc::new(PgTargetProvider::new(config.servers.clone())),
        config.max_chunk_bytes,
    );
    let app = router(AppState::new(processor, config.auth_tokens.clone()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("✓ Import endpoint listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .await
        .context("Import server failed")?;
    Ok(())
}
