use crate::error::ModelError;
use crate::models::EndpointConfig;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const MINILM_DIMENSIONS: usize = 384;

pub trait Embedder {
    /// Identifier persisted with the index; must match at load time.
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        (**self).embed_batch(texts)
    }
}

/// Offline embedder: hashed character trigrams, L2-normalised.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model_id: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("char-trigram-hash/{dimensions}"),
        }
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let chars = text.to_lowercase().chars().collect::<Vec<_>>();
        let mut vector = vec![0f32; self.dimensions];

        for trigram in chars.windows(3) {
            vector[trigram_bucket(trigram, self.dimensions)] += 1.0;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        Ok(vector)
    }
}

const HASH_SEED: u64 = 0x1465_0fb0_739d_0383;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a style hash over the UTF-8 bytes of the trigram.
fn trigram_bucket(trigram: &[char], buckets: usize) -> usize {
    let mut utf8 = [0u8; 4];
    let mut hash = HASH_SEED;
    for ch in trigram {
        for &byte in ch.encode_utf8(&mut utf8).as_bytes() {
            hash = (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME);
        }
    }
    (hash % buckets as u64) as usize
}

/// Blocking client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: url::Url,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(
        config: &EndpointConfig,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, ModelError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ModelError::InvalidConfig("missing embedding model name".to_string()));
        }
        if dimensions == 0 {
            return Err(ModelError::InvalidConfig(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.url_for("embeddings")?,
            api_key: config.api_key.clone(),
            model,
            dimensions,
            batch_size: 32,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn request_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut request = self.client.post(self.url.clone()).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ModelError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: EmbeddingResponse = response.json()?;
        ordered_embeddings(parsed, inputs.len(), self.dimensions)
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.request_batch(&[text])?
            .pop()
            .ok_or_else(|| ModelError::BackendResponse {
                backend: "embeddings".to_string(),
                details: "empty embedding response".to_string(),
            })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(batch = batch.len(), model = %self.model, "requesting embeddings");
            vectors.extend(self.request_batch(batch)?);
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

fn ordered_embeddings(
    mut response: EmbeddingResponse,
    expected_count: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, ModelError> {
    if response.data.len() != expected_count {
        return Err(ModelError::BackendResponse {
            backend: "embeddings".to_string(),
            details: format!(
                "returned {} embeddings for {} inputs",
                response.data.len(),
                expected_count
            ),
        });
    }

    response.data.sort_by_key(|entry| entry.index);
    response
        .data
        .into_iter()
        .map(|entry| {
            if entry.embedding.len() == dimensions {
                Ok(entry.embedding)
            } else {
                Err(ModelError::Dimension {
                    expected: dimensions,
                    actual: entry.embedding.len(),
                })
            }
        })
        .collect()
}
