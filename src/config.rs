use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::search::vector::IndexKind;

/// Smallest and largest accepted vibe boost factor.
pub const MIN_BOOST: f32 = 1.0;
pub const MAX_BOOST: f32 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the persisted index and record list live
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Index variant used for every freshly built or reset index
    pub index_type: IndexKind,
    /// Upper bound for `top_k` on both search paths
    pub max_top_k: usize,
    /// Hybrid search candidate multiplier (`top_k * overfetch_factor`)
    pub overfetch_factor: usize,
    /// Boost applied per matching tag when the caller does not send one
    pub default_boost: f32,
    /// Attribute used as the secondary filter and report grouping key
    pub group_key: String,
    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama", "openai" or "hash"
    pub provider: String,
    /// Base URL for the embedding API
    pub base_url: String,
    /// Model name for embeddings
    pub model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub dimension: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8088".to_string(),
            index_type: IndexKind::Flat,
            max_top_k: 100,
            overfetch_factor: 3,
            default_boost: 1.2,
            group_key: "province".to_string(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "bge-m3".to_string(),
            api_key: None,
            dimension: 1024,
        }
    }
}

impl Config {
    /// Build the configuration from defaults overridden by environment variables.
    ///
    /// Numeric values that fail to parse keep their default. An unknown index
    /// type is an error because every rebuild depends on it.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("VIBE_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("VIBE_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(kind) = std::env::var("VIBE_SEARCH_INDEX_TYPE") {
            config.index_type = kind.parse()?;
        }
        if let Ok(val) = std::env::var("VIBE_SEARCH_MAX_TOP_K") {
            if let Ok(v) = val.parse::<usize>() {
                config.max_top_k = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("VIBE_SEARCH_OVERFETCH_FACTOR") {
            if let Ok(v) = val.parse::<usize>() {
                config.overfetch_factor = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("VIBE_SEARCH_DEFAULT_BOOST") {
            if let Ok(v) = val.parse::<f32>() {
                config.default_boost = v.clamp(MIN_BOOST, MAX_BOOST);
            }
        }
        if let Ok(key) = std::env::var("VIBE_SEARCH_GROUP_KEY") {
            config.group_key = key;
        }

        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("EMBEDDING_DIM") {
            if let Ok(d) = dim.parse::<usize>() {
                if d > 0 {
                    config.embedding.dimension = d;
                }
            }
        }

        Ok(config)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.index_dir().join(self.index_type.file_name())
    }

    pub fn records_path(&self) -> PathBuf {
        self.index_dir().join("records.json")
    }
}
