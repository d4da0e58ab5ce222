use std::sync::Arc;
use tracing::info;

use papernav_core::config::{Config, Settings};
use papernav_core::traits::Embedder;
use papernav_core::Result;
use papernav_embed::SharedEncoder;
use papernav_index::LoadOutcome;

use crate::engine::HybridSearchEngine;

/// Process-wide state built once at startup and handed to every call site.
pub struct AppContext {
    settings: Settings,
    engine: HybridSearchEngine,
}

impl AppContext {
    /// Layered config (`config.toml`, `APP_*`), lazy encoder, empty engine.
    pub fn from_config() -> Result<Self> {
        let settings = Config::load()?.settings()?;
        Self::new(settings)
    }

    pub fn new(settings: Settings) -> Result<Self> {
        let encoder = Arc::new(SharedEncoder::new(settings.embedding.clone()));
        Self::with_encoder(settings, encoder)
    }

    /// Use an already-built encoder (tests, embedding the engine elsewhere).
    pub fn with_embedder(settings: Settings, embedder: Box<dyn Embedder>) -> Result<Self> {
        Self::with_encoder(settings, Arc::new(SharedEncoder::from_embedder(embedder)))
    }

    fn with_encoder(settings: Settings, encoder: Arc<SharedEncoder>) -> Result<Self> {
        settings.validate()?;
        let engine = HybridSearchEngine::new(encoder, &settings)?;
        info!(index_dir = %settings.data.index_dir().display(), dim = settings.embedding.dimension, "context ready");
        Ok(Self { settings, engine })
    }

    /// Restore the persisted index from `data.index_dir`.
    pub fn open_index(&self) -> LoadOutcome { self.engine.load() }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn engine(&self) -> &HybridSearchEngine { &self.engine }
}
