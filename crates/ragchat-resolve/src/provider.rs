//! Process-wide retriever provider.
//!
//! Created once at startup and shared through `Arc`. The ensemble retriever
//! itself is built lazily on the first request that carries an API key, then
//! reused for the lifetime of the process regardless of later keys.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ragchat_core::{Result, RetrievalConfig};
use ragchat_infer::{EmbedderBackend, OpenAIEmbedder};
use ragchat_ingest::{load_txt_files, split_documents, RecursiveSplitter};
use reqwest::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::ensemble::EnsembleRetriever;
use crate::keyword::KeywordRetriever;
use crate::vector::VectorRetriever;

/// Builds the embedding backend for a given API key.
pub type EmbedderFactory = Box<dyn Fn(&str) -> Result<Arc<dyn EmbedderBackend>> + Send + Sync>;

struct Built {
    retriever: Arc<EnsembleRetriever>,
    api_key: String,
}

/// Lazily builds and caches the ensemble retriever.
pub struct RetrieverProvider {
    docs_dir: PathBuf,
    config: RetrievalConfig,
    make_embedder: EmbedderFactory,
    slot: OnceCell<Built>,
    builds: AtomicUsize,
}

impl RetrieverProvider {
    pub fn new(docs_dir: PathBuf, config: RetrievalConfig, make_embedder: EmbedderFactory) -> Self {
        Self {
            docs_dir,
            config,
            make_embedder,
            slot: OnceCell::new(),
            builds: AtomicUsize::new(0),
        }
    }

    /// Provider whose embeddings come from an OpenAI-compatible endpoint.
    pub fn openai(client: Client, base_url: String, docs_dir: PathBuf, config: RetrievalConfig) -> Self {
        let model = config.embedding_model.clone();
        Self::new(
            docs_dir,
            config,
            Box::new(move |api_key| {
                let embedder = OpenAIEmbedder::new(client.clone(), &base_url, api_key, &model)?;
                Ok(Arc::new(embedder) as Arc<dyn EmbedderBackend>)
            }),
        )
    }

    /// The shared retriever, building it on first use.
    ///
    /// Concurrent first calls wait on a single construction. A failed
    /// construction leaves the slot empty so a later call can retry.
    pub async fn get_retriever(&self, api_key: &str) -> Result<Arc<EnsembleRetriever>> {
        let built = self
            .slot
            .get_or_try_init(|| async move {
                let retriever = self.build(api_key).await?;
                Ok::<_, ragchat_core::Error>(Built {
                    retriever: Arc::new(retriever),
                    api_key: api_key.to_string(),
                })
            })
            .await?;

        if built.api_key != api_key {
            debug!("Retriever already bound to the first session's key; ignoring the new key");
        }
        Ok(built.retriever.clone())
    }

    /// Whether the retriever has been built.
    pub fn is_ready(&self) -> bool {
        self.slot.initialized()
    }

    /// Number of construction attempts so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    async fn build(&self, api_key: &str) -> Result<EnsembleRetriever> {
        self.builds.fetch_add(1, Ordering::SeqCst);

        let docs = load_txt_files(&self.docs_dir)?;
        let splitter = RecursiveSplitter::new(self.config.chunk_size, self.config.chunk_overlap);
        let chunks = split_documents(&docs, &splitter);

        let embedder = (self.make_embedder)(api_key)?;
        let keyword = KeywordRetriever::build(&chunks, self.config.top_k)?;
        let chunk_count = chunks.len();
        let vector = VectorRetriever::build(chunks, embedder.clone(), self.config.top_k).await?;

        info!(
            "Ensemble retriever ready: {} documents, {} chunks, embeddings={}",
            docs.len(),
            chunk_count,
            embedder.model()
        );
        Ok(EnsembleRetriever::new(keyword, vector, &self.config, chunk_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Retriever;
    use crate::vector::tests::meal_embedder;
    use ragchat_core::Error;

    fn corpus() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("monday.txt"), "Monday: lentil soup").unwrap();
        std::fs::write(dir.path().join("tuesday.txt"), "Tuesday: tacos and salsa").unwrap();
        dir
    }

    fn provider(dir: &tempfile::TempDir) -> RetrieverProvider {
        RetrieverProvider::new(
            dir.path().to_path_buf(),
            RetrievalConfig::default(),
            Box::new(|_| Ok(meal_embedder())),
        )
    }

    #[tokio::test]
    async fn test_same_instance_across_calls() {
        let dir = corpus();
        let provider = provider(&dir);
        assert!(!provider.is_ready());

        let first = provider.get_retriever("sk-one").await.unwrap();
        let second = provider.get_retriever("sk-two").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.build_count(), 1);
        assert!(provider.is_ready());
        assert_eq!(first.chunk_count(), 2);

        let hits = second.retrieve("soup").await.unwrap();
        assert_eq!(hits[0].source, "monday.txt");
    }

    #[tokio::test]
    async fn test_concurrent_first_access_builds_once() {
        let dir = corpus();
        let provider = Arc::new(provider(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.get_retriever(&format!("sk-{}", i)).await })
            })
            .collect();

        let mut retrievers = Vec::new();
        for handle in handles {
            retrievers.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(provider.build_count(), 1);
        assert!(retrievers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(&dir);

        let err = provider.get_retriever("sk").await.unwrap_err();
        assert!(matches!(err, Error::Corpus(_)));
        assert!(!provider.is_ready());

        std::fs::write(dir.path().join("menu.txt"), "Friday: pasta with pesto").unwrap();
        assert!(provider.get_retriever("sk").await.is_ok());
        assert_eq!(provider.build_count(), 2);
    }
}
