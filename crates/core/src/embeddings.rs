use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Turns short texts into fixed-length vectors. Implementations should accept
/// batches so the corpus can be embedded in few calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the model; cached corpus vectors are tied to it.
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "char-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from an Ollama server's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let endpoint = Url::parse(base_url)?.join("api/embed")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SearchError::EmbeddingUnavailable(error.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|error| {
                SearchError::EmbeddingUnavailable(format!("{}: {error}", self.endpoint))
            })?;

        if !response.status().is_success() {
            return Err(SearchError::EmbeddingUnavailable(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|error| SearchError::InvalidEmbedding(error.to_string()))?;

        if payload.embeddings.len() != texts.len() {
            return Err(SearchError::InvalidEmbedding(format!(
                "{} vectors returned for {} texts",
                payload.embeddings.len(),
                texts.len()
            )));
        }

        Ok(payload.embeddings)
    }
}

/// Cosine similarity in [-1, 1]; zero when either vector has no magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right.iter()) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    (dot / (left_norm.sqrt() * right_norm.sqrt())).clamp(-1.0, 1.0)
}

/// Checks the shape of a batch returned by an embedder.
pub(crate) fn validate_batch(
    embedder: &dyn Embedder,
    vectors: &[Vec<f32>],
    expected: usize,
) -> Result<(), SearchError> {
    if vectors.len() != expected {
        return Err(SearchError::InvalidEmbedding(format!(
            "{} returned {} vectors for {} texts",
            embedder.name(),
            vectors.len(),
            expected
        )));
    }

    if let Some(bad) = vectors.iter().find(|vector| vector.len() != embedder.dimensions()) {
        return Err(SearchError::InvalidEmbedding(format!(
            "{} returned a {}-dimensional vector, expected {}",
            embedder.name(),
            bad.len(),
            embedder.dimensions()
        )));
    }

    Ok(())
}
