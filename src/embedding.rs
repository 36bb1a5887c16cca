//! Embedding provider abstraction and vector utilities.
//!
//! Defines the [`Embedder`] trait the pipeline depends on and its one
//! concrete implementation:
//! - **[`HttpEmbedder`]**: calls an embedding service over HTTP
//!   (`POST <url>/embed/text`).
//!
//! Also provides the vector helpers shared by the store backends:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Failure policy
//!
//! The embedder never retries. Connection failures, timeouts, HTTP 429 and
//! 5xx responses surface as [`ServiceUnavailable`](PrecedentError::ServiceUnavailable);
//! retry and backoff belong to whoever calls the pipeline. Vectors of the
//! wrong length are rejected with
//! [`DimensionMismatch`](PrecedentError::DimensionMismatch) so that
//! mismatched models never produce meaningless distances.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{check_dims, PrecedentError, Result, Service};

/// Text-to-vector collaborator.
///
/// Must be the same model (and version) that produced the indexed vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nlpaueb/legal-bert-base-uncased"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
    normalize: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an HTTP embedding service.
///
/// Sends `{"text": ..., "normalize": true}` and expects
/// `{"embedding": [f32; dims]}` back.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dims: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PrecedentError::backend("build embedding client", base_url, e))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embed/text", base_url.trim_end_matches('/')),
            model: model.into(),
            dims,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let context = preview(text);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest {
                text,
                normalize: true,
            })
            .send()
            .await
            .map_err(|e| PrecedentError::unavailable(Service::Embedding, "embed", &context, e))?;

        let status = response.status();
        let body = read_body(response, &context).await?;
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(PrecedentError::unavailable(
                Service::Embedding,
                "embed",
                &context,
                format!("HTTP {}: {}", status, String::from_utf8_lossy(&body)),
            ));
        }
        if !status.is_success() {
            return Err(PrecedentError::backend(
                "embed",
                &context,
                format!("HTTP {}: {}", status, String::from_utf8_lossy(&body)),
            ));
        }

        let parsed: EmbedResponse = serde_json::from_slice(&body)
            .map_err(|e| PrecedentError::backend("embed", &context, e))?;

        check_dims(self.dims, &parsed.embedding, "embedding response")?;
        Ok(parsed.embedding)
    }
}

/// Read the full response body.
///
/// The client timeout covers the body too, so a stalled or dropped body is
/// a transport failure like a failed `send`.
async fn read_body(response: reqwest::Response, context: &str) -> Result<Vec<u8>> {
    let body = response
        .bytes()
        .await
        .map_err(|e| PrecedentError::unavailable(Service::Embedding, "embed", context, e))?;
    Ok(body.to_vec())
}

/// Create the configured [`Embedder`].
///
/// # Errors
///
/// Returns a validation error when the provider is `"disabled"` or the
/// `http` provider has no URL.
pub fn create_embedder(config: &EmbeddingConfig, dims: usize) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "http" => {
            let url = config.url.as_deref().ok_or_else(|| {
                PrecedentError::validation("embedding.url required for http provider")
            })?;
            let model = config.model.clone().unwrap_or_else(|| "default".to_string());
            Ok(Box::new(HttpEmbedder::new(
                url,
                model,
                dims,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "disabled" => Err(PrecedentError::validation(
            "embedding provider is disabled. Set [embedding] provider = \"http\" in config.",
        )),
        other => Err(PrecedentError::validation(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(60).collect();
    if text.chars().count() > 60 {
        out.push_str("...");
    }
    out
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use precedent::embedding::{vec_to_blob, blob_to_vec};
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
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors. Accumulates in `f64` and
/// clamps, so rounding never pushes a self-match above `1.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
