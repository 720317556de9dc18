//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::sync::{SyncEngine, SyncError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    engine: Arc<SyncEngine>,
}

impl AppState {
    /// Create the state, preparing vault and buffer directories
    pub async fn new(config: Config) -> Result<Self, SyncError> {
        let engine = SyncEngine::open(&config.vault, config.sync.clone()).await?;
        Ok(Self::with_engine(config, engine))
    }

    /// Wrap an already built engine
    pub fn with_engine(config: Config, engine: SyncEngine) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine: Arc::new(engine),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the sync engine
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }
}
