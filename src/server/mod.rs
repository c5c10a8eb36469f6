// HTTP search API
// POST /search, POST /chat and GET /status over the configured collection


mod errors;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::Request;
use axum::routing::{get, post};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::info;

use crate::chat::ConversationalAgent;
use crate::config::Config;
use crate::embeddings::{Embedder, TextEmbedder};

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub agent: Arc<ConversationalAgent>,
}

impl AppState {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn TextEmbedder>) -> Self {
        let agent = ConversationalAgent::new(&config.llm);
        Self {
            config: Arc::new(config),
            embedder,
            agent: Arc::new(agent),
        }
    }

    /// State with the embedder selected by `config`
    #[inline]
    pub fn from_config(config: Config) -> crate::Result<Self> {
        let embedder = Embedder::from_config(&config)?;
        Ok(Self::new(config, Arc::new(embedder)))
    }
}

#[inline]
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/search", post(handlers::search))
        .route("/chat", post(handlers::chat))
        .route("/status", get(handlers::status))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Millis)),
        )
        .with_state(state)
}

/// Serve the API on `bind` until Ctrl-C
#[inline]
pub async fn serve(config: Config, bind: SocketAddr) -> Result<()> {
    let collection = config.database.collection.clone();
    let state = AppState::from_config(config).context("Failed to initialise search state")?;
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(
        "Property search API listening on {} (collection '{}')",
        bind, collection
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(error) => tracing::error!(%error, "failed to install Ctrl-C handler"),
    }
}
