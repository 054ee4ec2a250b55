//! Configuration loaded from the environment (and `.env`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_DOCS_DIR: &str = "data";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Reciprocal rank fusion constant.
pub const DEFAULT_RRF_C: usize = 60;

/// Retrieval and corpus-splitting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub embedding_model: String,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Ensemble weights, keyword first.
    pub keyword_weight: f64,
    pub vector_weight: f64,
    pub rrf_c: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            top_k: DEFAULT_TOP_K,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            keyword_weight: 0.5,
            vector_weight: 0.5,
            rrf_c: DEFAULT_RRF_C,
        }
    }
}

/// Top-level RAGChat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagChatConfig {
    /// HTTP server port.
    pub port: u16,
    /// Directory holding the `*.txt` corpus.
    pub docs_dir: PathBuf,
    /// Base URL of the OpenAI-compatible API used for embeddings.
    pub openai_base_url: String,
    /// Per-request timeout for outbound HTTP calls. `None` waits forever.
    #[serde(skip)]
    pub request_timeout: Option<Duration>,
    pub retrieval: RetrievalConfig,
}

impl Default for RagChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            docs_dir: PathBuf::from(DEFAULT_DOCS_DIR),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            request_timeout: None,
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl RagChatConfig {
    /// Load `.env` (never overriding set variables) and read the process environment.
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    /// Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());

        let retrieval = RetrievalConfig {
            embedding_model: lookup("RAGCHAT_EMBEDDING_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.retrieval.embedding_model),
            top_k: parsed("RAGCHAT_TOP_K")
                .filter(|k| *k > 0)
                .unwrap_or(defaults.retrieval.top_k),
            chunk_size: parsed("RAGCHAT_CHUNK_SIZE")
                .filter(|s| *s > 0)
                .unwrap_or(defaults.retrieval.chunk_size),
            chunk_overlap: parsed("RAGCHAT_CHUNK_OVERLAP").unwrap_or(defaults.retrieval.chunk_overlap),
            ..defaults.retrieval
        };

        Self {
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            docs_dir: lookup("RAGCHAT_DOCS_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.docs_dir),
            openai_base_url: lookup("OPENAI_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            request_timeout: parsed("RAGCHAT_REQUEST_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(|s| Duration::from_secs(s as u64)),
            retrieval,
        }
    }
}
