use std::sync::Arc;

use crate::config::Config;
use crate::llm::embeddings::{self, EmbeddingProvider};
use crate::search::retrieval::{RetrievalSettings, Retriever};
use crate::search::sync::{SnapshotPaths, SyncEngine};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<SyncEngine>,
    pub retriever: Arc<Retriever>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        let embedder = embeddings::from_config(http_client, &config.embedding)?;
        Self::with_embedder(config, embedder)
    }

    /// Build state around an already constructed embedding provider.
    pub fn with_embedder(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(config.index_dir())?;

        let engine = Arc::new(SyncEngine::open(
            config.index_type,
            embedder,
            SnapshotPaths::from_config(&config),
        )?);
        let retriever = Arc::new(Retriever::new(
            Arc::clone(&engine),
            RetrievalSettings::from_config(&config),
        ));

        Ok(Self {
            config: Arc::new(config),
            engine,
            retriever,
        })
    }
}
