//! Embedding backend trait and the OpenAI-compatible implementation.

use async_trait::async_trait;
use ndarray::Array1;
use ragchat_core::{is_blank, Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::cache::QueryCache;

/// Inputs sent per `/embeddings` request.
const EMBED_BATCH_SIZE: usize = 100;

/// Trait for embedding backends.
#[async_trait]
pub trait EmbedderBackend: Send + Sync {
    /// Embed corpus texts, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Array1<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Array1<f32>>;

    /// Model identifier the vectors come from.
    fn model(&self) -> &str;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAIEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    cache: QueryCache,
}

impl OpenAIEmbedder {
    pub fn new(client: Client, base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        if is_blank(api_key) {
            return Err(Error::MissingCredential("OPENAI_API_KEY".into()));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            cache: QueryCache::default(),
        })
    }

    /// The key this embedder was bound to.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Array1<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!("Embedding {} inputs with {}", inputs.len(), self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "input": inputs,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("API error {}: {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Malformed response: {}", e)))?;

        if parsed.data.len() != inputs.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed
            .data
            .into_iter()
            .map(|d| Array1::from(d.embedding))
            .collect())
    }
}

#[async_trait]
impl EmbedderBackend for OpenAIEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Array1<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Array1<f32>> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let embedding = self
            .request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response".into()))?;
        self.cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
