use std::sync::Arc;

use tracing::info;

use super::{
    config::{Config, ConfigError, StoreBackend},
    database::{DocumentStore, Documents, MemoryStore, RedisStore, StoreError, init_redis},
};

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct AppState {
    pub config: Config,
    pub documents: Documents,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>, StartupError> {
        let config = Config::load()?;

        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Redis => {
                info!("Connecting to Redis at {}", config.redis_url);
                Arc::new(RedisStore::new(init_redis(&config.redis_url).await?))
            }
            StoreBackend::Memory => {
                info!("Using in-memory store, documents will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        Arc::new(Self {
            config,
            documents: Documents::new(store),
        })
    }
}
