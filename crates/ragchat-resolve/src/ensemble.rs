//! Ensemble retriever: keyword + vector rankings fused with weighted RRF.

use std::collections::HashMap;

use async_trait::async_trait;
use ragchat_core::{Result, RetrievalConfig};

use crate::keyword::KeywordRetriever;
use crate::types::{Fragment, Retriever};
use crate::vector::VectorRetriever;

/// Fuse ranked lists with weighted Reciprocal Rank Fusion.
///
/// score(d) = Σ weight_i / (c + rank_i(d)), ranks starting at 1. Fragments
/// are deduplicated by chunk id; the first list a chunk appears in supplies
/// its text.
pub fn weighted_rank_fusion(lists: &[Vec<Fragment>], weights: &[f64], c: usize) -> Vec<Fragment> {
    let mut scores: HashMap<usize, f64> = HashMap::new();
    let mut first_seen: Vec<&Fragment> = Vec::new();

    for (list, weight) in lists.iter().zip(weights) {
        for (rank, fragment) in list.iter().enumerate() {
            let entry = scores.entry(fragment.chunk_id).or_insert_with(|| {
                first_seen.push(fragment);
                0.0
            });
            *entry += weight / (c as f64 + rank as f64 + 1.0);
        }
    }

    let mut fused: Vec<Fragment> = first_seen
        .into_iter()
        .map(|f| Fragment {
            score: scores.get(&f.chunk_id).copied().unwrap_or(0.0),
            ..f.clone()
        })
        .collect();
    // Stable sort keeps first-seen order among ties.
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// BM25 + vector retriever.
pub struct EnsembleRetriever {
    keyword: KeywordRetriever,
    vector: VectorRetriever,
    weights: [f64; 2],
    rrf_c: usize,
    top_k: usize,
    chunk_count: usize,
}

impl std::fmt::Debug for EnsembleRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleRetriever")
            .field("weights", &self.weights)
            .field("rrf_c", &self.rrf_c)
            .field("top_k", &self.top_k)
            .field("chunk_count", &self.chunk_count)
            .finish_non_exhaustive()
    }
}

impl EnsembleRetriever {
    pub fn new(
        keyword: KeywordRetriever,
        vector: VectorRetriever,
        config: &RetrievalConfig,
        chunk_count: usize,
    ) -> Self {
        Self {
            keyword,
            vector,
            weights: [config.keyword_weight, config.vector_weight],
            rrf_c: config.rrf_c,
            top_k: config.top_k,
            chunk_count,
        }
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }
}

#[async_trait]
impl Retriever for EnsembleRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Fragment>> {
        let keyword_hits = self.keyword.retrieve(query).await?;
        let vector_hits = self.vector.retrieve(query).await?;
        let lists = [keyword_hits, vector_hits];
        let mut fused = weighted_rank_fusion(&lists, &self.weights, self.rrf_c);
        fused.truncate(self.top_k);
        Ok(fused)
    }
}
