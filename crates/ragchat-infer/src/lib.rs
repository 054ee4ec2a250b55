//! RAGChat Infer: embedding backends and the query embedding cache.
//!
//! `EmbedderBackend` abstracts over embedding generation. The shipped
//! backend is `OpenAIEmbedder`, which calls an OpenAI-compatible
//! `/embeddings` endpoint and caches query vectors in a `QueryCache`.

pub mod cache;
pub mod embedder;

pub use cache::QueryCache;
pub use embedder::{EmbedderBackend, OpenAIEmbedder};
