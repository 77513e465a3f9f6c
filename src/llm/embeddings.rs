use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::{Result, ServiceError};

/// Maximum characters to send per text to the embedding API.
const MAX_EMBED_CHARS: usize = 3_000;

/// Text to fixed-dimension, L2-normalised vectors.
///
/// Output order matches input order and identical input yields identical
/// vectors. Any malformed input fails the whole batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    /// Human-readable model name for health output.
    fn model_name(&self) -> &str;
}

/// Build the provider named in the configuration.
pub fn from_config(
    client: reqwest::Client,
    config: &EmbeddingConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "ollama" | "openai" => Ok(Arc::new(HttpEmbedder::new(client, config.clone()))),
        "hash" => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        other => anyhow::bail!("Unknown embedding provider: {other}"),
    }
}

/// Generate the embedding for a single text.
pub async fn embed_single(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Embedding("No embedding returned".to_string()))
}

/// Scale `v` to unit length. Zero vectors cannot be normalised.
pub fn l2_normalize(mut v: Vec<f32>) -> Result<Vec<f32>> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(ServiceError::Embedding(
            "cannot normalise a zero or non-finite vector".to_string(),
        ));
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    Ok(v)
}

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn reject_blank(texts: &[String]) -> Result<()> {
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(ServiceError::Embedding(format!(
            "text at position {pos} is empty"
        )));
    }
    Ok(())
}

// ─── HTTP (Ollama / OpenAI-compatible) ───────────────────

/// Embeddings fetched from a model server, normalised locally.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: EmbeddingConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        reject_blank(texts)?;

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        let raw = match self.config.provider.as_str() {
            "ollama" => embed_ollama(&self.client, &self.config, &truncated).await,
            "openai" => embed_openai(&self.client, &self.config, &truncated).await,
            other => Err(ServiceError::Embedding(format!(
                "Unknown embedding provider: {other}"
            ))),
        }?;

        if raw.len() != texts.len() {
            return Err(ServiceError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                raw.len(),
                texts.len()
            )));
        }

        raw.into_iter()
            .map(|v| {
                if v.len() != self.config.dimension {
                    return Err(ServiceError::Embedding(format!(
                        "provider returned dimension {}, expected {}",
                        v.len(),
                        self.config.dimension
                    )));
                }
                l2_normalize(v)
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url);

    let batch_size = 32;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OllamaEmbedRequest {
            model: config.model.clone(),
            input: chunk.to_vec(),
            truncate: true,
        };

        let resp = client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ServiceError::Embedding(format!("Failed to call Ollama embed API: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Embedding(format!(
                "Ollama embed API returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = resp.json().await.map_err(|e| {
            ServiceError::Embedding(format!("Failed to parse Ollama embed response: {e}"))
        })?;

        all_embeddings.extend(body.embeddings);
    }

    Ok(all_embeddings)
}

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    index: Option<usize>,
    embedding: Vec<f32>,
}

async fn embed_openai(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url);
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let batch_size = 64;
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size) {
        let req = OpenAiEmbedRequest {
            model: config.model.clone(),
            input: chunk.to_vec(),
        };

        let resp = client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .map_err(|e| ServiceError::Embedding(format!("Failed to call OpenAI embed API: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Embedding(format!(
                "OpenAI embed API returned {status}: {body}"
            )));
        }

        let mut body: OpenAiEmbedResponse = resp.json().await.map_err(|e| {
            ServiceError::Embedding(format!("Failed to parse OpenAI embed response: {e}"))
        })?;

        // The API may return items out of order; `index` restores input order.
        body.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        all_embeddings.extend(body.data.into_iter().map(|d| d.embedding));
    }

    Ok(all_embeddings)
}

// ─── Local hashing embedder ──────────────────────────────

/// Deterministic bag-of-words embedder for offline runs and tests.
///
/// Each lowercase alphanumeric token is hashed into one signed bucket, so
/// texts sharing words have a positive inner product. Not semantic.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let h = token_hash(&token);
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(ServiceError::Embedding(format!(
                "text has no embeddable tokens: {text:?}"
            )));
        }
        l2_normalize(v)
    }
}

/// First eight bytes of the token's SHA-256. Fixed across builds, so
/// persisted vectors keep matching new queries.
fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        reject_blank(texts)?;
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-bow"
    }
}
