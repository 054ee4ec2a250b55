//! Retriever types.

use async_trait::async_trait;
use ragchat_core::Result;
use serde::Serialize;

/// A retrieved piece of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub chunk_id: usize,
    pub source: String,
    pub text: String,
    /// Strategy-specific score; higher is better.
    pub score: f64,
}

/// Maps a query to an ordered list of fragments, best first.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Fragment>>;
}
