//! RAG chat chain with external LLM streaming (OpenAI / HuggingFace router).
//!
//! A chain retrieves context for the question, prompts the model with the
//! context plus the session's chat history, and streams the answer back.

pub mod chain;
pub mod config;
pub mod history;
pub mod providers;
pub mod types;

pub use chain::{collect_answer, ChainProvider, ConversationalChain, QaChain, RagChainProvider};
pub use config::LLMConfig;
pub use history::ChatHistory;
pub use types::*;
