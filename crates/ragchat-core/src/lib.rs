//! RAGChat Core: configuration, credentials, error type.

pub mod config;
pub mod credentials;
pub mod error;

pub use config::{RagChatConfig, RetrievalConfig};
pub use credentials::{
    is_blank, CredentialSpec, EnvSource, ProcessEnv, HUGGINGFACEHUB_API_TOKEN, OPENAI_API_KEY,
};
pub use error::{Error, Result};
