//! Gateway shared state.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use makereal_canvas::{Board, SnapshotRegistry};
use makereal_core::config::Config;
use makereal_providers::{Credentials, LlmProvider, OpenAiProvider};

use crate::surfaces::SurfaceManager;

/// Shared gateway state accessible from all handlers and connections.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub board: RwLock<Board>,
    pub snapshots: SnapshotRegistry,
    pub surfaces: SurfaceManager,
    pub provider: Arc<dyn LlmProvider>,
    /// Key set through the API for this process only. Takes precedence over
    /// the configured one.
    pub session_api_key: RwLock<Option<String>>,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, provider: Arc<dyn LlmProvider>) -> Self {
        let snapshots = SnapshotRegistry::new(config.handshake_timeout());
        Self {
            config,
            board: RwLock::new(Board::new()),
            snapshots,
            surfaces: SurfaceManager::new(),
            provider,
            session_api_key: RwLock::new(None),
            started_at: Instant::now(),
        }
    }

    /// State with the provider described by the config's make-real settings.
    pub fn from_config(config: Arc<Config>) -> Self {
        let provider = provider_from_config(&config);
        Self::new(config, provider)
    }

    /// Credentials for the next model call.
    ///
    /// An empty key is passed through; the provider answers it with an error
    /// payload the user can act on.
    pub async fn credentials(&self) -> Credentials {
        if let Some(key) = self.session_api_key.read().await.clone() {
            return Credentials::api_key(key);
        }
        let key = self
            .config
            .make_real_provider()
            .and_then(|p| p.resolve_api_key())
            .unwrap_or_default();
        Credentials::api_key(key)
    }
}

/// Build the OpenAI-compatible provider named by the config.
pub fn provider_from_config(config: &Config) -> Arc<dyn LlmProvider> {
    match config.make_real_provider() {
        Some(pc) => Arc::new(OpenAiProvider::openai(pc.base_url.as_deref()).with_id(pc.id.clone())),
        None => Arc::new(OpenAiProvider::openai(None)),
    }
}
