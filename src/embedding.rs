//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`GeminiEmbedder`]**: calls the Gemini `batchEmbedContents` endpoint.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API.
//!
//! Also provides vector utilities for the SQLite index:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the
//! configuration:
//!
//! ```rust,no_run
//! # use pdf_chat::config::EmbeddingConfig;
//! # use pdf_chat::embedding::{create_embedder, EmbeddingProvider};
//! let mut config = EmbeddingConfig::default();
//! config.provider = "disabled".to_string();
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```
//!
//! # Retries
//!
//! By default a failed call aborts immediately. With `embedding.max_retries`
//! above zero, HTTP 429, 5xx, and network errors are retried with
//! exponential backoff (1s, 2s, 4s, ... capped at 32s); other 4xx responses
//! always fail immediately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// What a batch of texts is being embedded for.
///
/// Some providers produce better retrieval vectors when told whether a text
/// is a stored document or a search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Document,
    Query,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"models/embedding-001"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embeds a batch of texts, returning one vector per text in input order.
    async fn embed(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()], EmbedKind::Query).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| Error::invalid_response(provider.model_name(), "empty embedding response"))
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"gemini"` | [`GeminiEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
///
/// # Errors
///
/// [`Error::MissingCredential`] when the API key variable is unset;
/// [`Error::Config`] for unknown provider names.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "gemini" => Ok(Box::new(GeminiEmbedder::new(config)?)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        other => Err(Error::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Reads an API key from the environment.
pub(crate) fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::MissingCredential {
            var: var.to_string(),
        }),
    }
}

pub(crate) fn http_client(provider: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::remote(provider, e))
}

/// Sends a request, retrying transient failures up to `max_retries` times.
///
/// Returns the successful response; non-retryable statuses and exhausted
/// retries become [`Error::Remote`] carrying the status and body.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    max_retries: u32,
    build: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(provider, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::remote(provider, format!("{}: {}", status, body_text));

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                last_err = Some(Error::remote(provider, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::remote(provider, "request failed after retries")))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        Err(Error::Config(
            "Embedding provider is disabled. Set [embedding] provider in config.".to_string(),
        ))
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini API.
///
/// Calls `POST /v1beta/models/{model}:batchEmbedContents` with the API key
/// read from `embedding.api_key_env` (default `GEMINI_API_KEY`).
pub struct GeminiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
    http: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            http: http_client("gemini", config.timeout_secs)?,
        })
    }

    /// Model name without the `models/` prefix, as used in the URL path.
    fn bare_model(&self) -> &str {
        self.model.strip_prefix("models/").unwrap_or(&self.model)
    }

    fn batch_embed_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.bare_model()
        )
    }
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiEmbedRequest<'a> {
    model: String,
    content: GeminiContent<'a>,
    task_type: &'static str,
}

#[derive(Debug, Serialize)]
struct GeminiBatchRequest<'a> {
    requests: Vec<GeminiEmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let task_type = match kind {
            EmbedKind::Document => "RETRIEVAL_DOCUMENT",
            EmbedKind::Query => "RETRIEVAL_QUERY",
        };
        let body = GeminiBatchRequest {
            requests: texts
                .iter()
                .map(|text| GeminiEmbedRequest {
                    model: format!("models/{}", self.bare_model()),
                    content: GeminiContent {
                        parts: vec![GeminiPart { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        debug!(model = %self.model, count = texts.len(), "gemini embed batch");
        let url = self.batch_embed_url();
        let response = send_with_retry("gemini", self.max_retries, || {
            self.http
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
        })
        .await?;

        let parsed: GeminiBatchResponse = response
            .json()
            .await
            .map_err(|e| Error::invalid_response("gemini", e.to_string()))?;

        let vectors: Vec<Vec<f32>> = parsed.embeddings.into_iter().map(|e| e.values).collect();
        check_batch("gemini", texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. The API key is
/// read from `embedding.api_key_env` (set it to `OPENAI_API_KEY`).
pub struct OpenAIEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
    http: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            http: http_client("openai", config.timeout_secs)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        debug!(model = %self.model, count = texts.len(), "openai embed batch");
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let response = send_with_retry("openai", self.max_retries, || {
            self.http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let mut parsed: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::invalid_response("openai", e.to_string()))?;

        // Sort by index to ensure order matches input
        parsed.data.sort_by_key(|item| item.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        check_batch("openai", texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

fn check_batch(provider: &str, expected: usize, dims: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::invalid_response(
            provider,
            format!("expected {} embeddings, got {}", expected, vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(Error::invalid_response(
            provider,
            format!("expected embedding dimension {}, got {}", dims, bad.len()),
        ));
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use pdf_chat::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
