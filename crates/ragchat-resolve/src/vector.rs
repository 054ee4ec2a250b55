//! Cosine-similarity retriever over a pre-normalized embedding matrix.

use std::sync::Arc;

use async_trait::async_trait;
use ndarray::{Array1, Array2};
use ragchat_core::{Error, Result};
use ragchat_infer::EmbedderBackend;
use ragchat_ingest::TextChunk;
use tracing::debug;

use crate::types::{Fragment, Retriever};

/// Vector retriever: chunk embeddings stacked into an (N, dim) matrix.
pub struct VectorRetriever {
    /// Row-normalized embeddings, row i belongs to `chunks[i]`.
    matrix: Array2<f32>,
    chunks: Vec<TextChunk>,
    embedder: Arc<dyn EmbedderBackend>,
    top_k: usize,
}

impl VectorRetriever {
    /// Embed every chunk and build the search matrix.
    pub async fn build(
        chunks: Vec<TextChunk>,
        embedder: Arc<dyn EmbedderBackend>,
        top_k: usize,
    ) -> Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        let matrix = stack_normalized(&embeddings)?;
        debug!(
            "Vector index built: {} rows, dim={}, model={}",
            matrix.nrows(),
            matrix.ncols(),
            embedder.model()
        );
        Ok(Self {
            matrix,
            chunks,
            embedder,
            top_k,
        })
    }

    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    /// Top-k chunks by cosine similarity to `query_embedding`.
    pub fn search_embedding(
        &self,
        query_embedding: &Array1<f32>,
        top_k: usize,
    ) -> Result<Vec<Fragment>> {
        if self.matrix.nrows() == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.len() != self.dimension() {
            return Err(Error::Retrieval(format!(
                "query dimension {} does not match index dimension {}",
                query_embedding.len(),
                self.dimension()
            )));
        }

        let q_norm = query_embedding.dot(query_embedding).sqrt();
        if q_norm < 1e-9 {
            return Ok(Vec::new());
        }
        let q = query_embedding / q_norm;

        // (N, dim) @ (dim,) -> (N,)
        let similarities = self.matrix.dot(&q);

        let mut indexed: Vec<(usize, f32)> = similarities.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        indexed.truncate(top_k);

        Ok(indexed
            .into_iter()
            .map(|(i, score)| {
                let chunk = &self.chunks[i];
                Fragment {
                    chunk_id: chunk.id,
                    source: chunk.source.clone(),
                    text: chunk.text.clone(),
                    score: score as f64,
                }
            })
            .collect())
    }
}

/// Stack vectors into a matrix and normalize rows for dot-product cosine.
fn stack_normalized(embeddings: &[Array1<f32>]) -> Result<Array2<f32>> {
    let Some(first) = embeddings.first() else {
        return Ok(Array2::zeros((0, 0)));
    };
    let dim = first.len();

    let mut matrix = Array2::zeros((embeddings.len(), dim));
    for (i, emb) in embeddings.iter().enumerate() {
        if emb.len() != dim {
            return Err(Error::Embedding(format!(
                "inconsistent embedding dimension: {} vs {}",
                emb.len(),
                dim
            )));
        }
        matrix.row_mut(i).assign(emb);
    }

    for mut row in matrix.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 1e-9 {
            row /= norm;
        }
    }
    Ok(matrix)
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Fragment>> {
        let embedding = self.embedder.embed_query(query).await?;
        self.search_embedding(&embedding, self.top_k)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Deterministic embedder: one dimension per vocabulary word.
    pub(crate) struct VocabEmbedder {
        pub vocab: Vec<&'static str>,
    }

    impl VocabEmbedder {
        fn vectorize(&self, text: &str) -> Array1<f32> {
            let lower = text.to_lowercase();
            Array1::from(
                self.vocab
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect::<Vec<_>>(),
            )
        }
    }

    #[async_trait]
    impl EmbedderBackend for VocabEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Array1<f32>>> {
            Ok(texts.iter().map(|t| self.vectorize(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Array1<f32>> {
            Ok(self.vectorize(text))
        }

        fn model(&self) -> &str {
            "vocab"
        }
    }

    pub(crate) fn meal_chunks() -> Vec<TextChunk> {
        [
            "Monday: lentil soup",
            "Tuesday: tacos and salsa",
            "Wednesday: pasta with pesto",
        ]
        .iter()
        .enumerate()
        .map(|(id, text)| TextChunk {
            id,
            source: "week.txt".into(),
            text: text.to_string(),
        })
        .collect()
    }

    pub(crate) fn meal_embedder() -> Arc<dyn EmbedderBackend> {
        Arc::new(VocabEmbedder {
            vocab: vec!["soup", "tacos", "salsa", "pasta", "pesto"],
        })
    }

    #[tokio::test]
    async fn test_retrieve_orders_by_similarity() {
        let retriever = VectorRetriever::build(meal_chunks(), meal_embedder(), 2)
            .await
            .unwrap();
        let hits = retriever.retrieve("any tacos with salsa?").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_zero_query_returns_nothing() {
        let retriever = VectorRetriever::build(meal_chunks(), meal_embedder(), 2)
            .await
            .unwrap();
        assert!(retriever.retrieve("sushi").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        let retriever = VectorRetriever::build(meal_chunks(), meal_embedder(), 2)
            .await
            .unwrap();
        let err = retriever
            .search_embedding(&Array1::from(vec![1.0, 0.0]), 2)
            .unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }
}
