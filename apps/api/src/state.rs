use std::sync::Arc;

use crate::analysis::session::SessionStore;
use crate::analysis::storage::VideoStorage;
use crate::config::Config;
use crate::llm_client::MediaModel;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Remote multimodal service. `GeminiClient` in production.
    pub model: Arc<dyn MediaModel>,
    pub sessions: SessionStore,
    pub storage: VideoStorage,
}
