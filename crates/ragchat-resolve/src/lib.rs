//! Retrievers: keyword, vector and their ensemble.
//!
//! The ensemble fuses a BM25 keyword ranking with a cosine-similarity
//! ranking using weighted reciprocal rank fusion. `RetrieverProvider` builds
//! it once per process and hands out shared handles.

pub mod ensemble;
pub mod keyword;
pub mod provider;
pub mod types;
pub mod vector;

pub use ensemble::{weighted_rank_fusion, EnsembleRetriever};
pub use keyword::KeywordRetriever;
pub use provider::{EmbedderFactory, RetrieverProvider};
pub use types::*;
pub use vector::VectorRetriever;
