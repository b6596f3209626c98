mod config;
mod errors;
mod evaluation;
mod llm_client;
mod report;
mod routes;
mod rubric;
mod session;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::OpenAiClient;
use crate::routes::build_router;
use crate::rubric::Rubric;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting evaluator API v{}", env!("CARGO_PKG_VERSION"));

    // Rubric table: loaded once, shared read-only
    let rubric = match &config.criteria_path {
        Some(path) => Rubric::from_path(path)?,
        None => Rubric::builtin()?,
    };
    info!(
        "Rubric loaded: {} criteria, max score {}",
        rubric.len(),
        rubric.max_score()
    );

    // Initialize LLM client
    let llm = OpenAiClient::new(
        &config.openai_base_url,
        Duration::from_secs(config.llm_timeout_secs),
        config.llm_json_mode,
    )
    .context("Failed to build HTTP client")?;
    info!(
        "LLM client initialized (model: {}, temperature: {}, json mode: {})",
        llm_client::MODEL,
        llm_client::TEMPERATURE,
        config.llm_json_mode
    );
    if config.openai_api_key.is_none() {
        info!("No server-side OPENAI_API_KEY; every request must supply its own credential");
    }

    let state = AppState {
        llm: Arc::new(llm),
        rubric: Arc::new(rubric),
        sessions: SessionStore::with_ttl(Duration::from_secs(config.session_ttl_secs)),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the form has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
