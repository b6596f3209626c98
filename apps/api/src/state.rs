use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::CompletionClient;
use crate::rubric::Rubric;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable completion backend. Default: OpenAiClient.
    pub llm: Arc<dyn CompletionClient>,
    /// Loaded once at startup, never mutated.
    pub rubric: Arc<Rubric>,
    pub sessions: SessionStore,
    pub config: Config,
}
