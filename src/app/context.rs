use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{GatorError, Result};
use crate::config::{Config, ConfigError};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::ingest::Ingestor;
use crate::normalizer::Normalizer;
use crate::store::sqlite::SqliteStore;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub normalizer: Normalizer,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = match config.db_path.clone() {
            Some(p) => p,
            None => Self::default_db_path()?,
        };
        tracing::debug!(db = %db_path.display(), "Opening database");

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::with_store(config, store)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::with_store(config, store)
    }

    fn with_store(config: Config, store: Arc<SqliteStore>) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new()?);

        Ok(Self {
            config,
            store,
            fetcher,
            normalizer: Normalizer::new(),
        })
    }

    /// An ingestion engine over this context's store and fetcher.
    pub fn ingestor(&self) -> Result<Ingestor> {
        Ingestor::new(
            self.store.clone(),
            self.fetcher.clone(),
            self.normalizer.clone(),
            self.config.poll.request_timeout()?,
        )
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| GatorError::Config(ConfigError::NoConfigDir))?;
        let gator_dir = data_dir.join("gator");
        std::fs::create_dir_all(&gator_dir)?;
        Ok(gator_dir.join("gator.db"))
    }
}
