//! Conversational retrieval chain.

use std::sync::Arc;

use async_trait::async_trait;
use ragchat_core::{Error, Result};
use ragchat_resolve::{Fragment, Retriever, RetrieverProvider};
use reqwest::Client;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::config::LLMConfig;
use crate::history::ChatHistory;
use crate::providers::{self, BoxedStream, Sampling, StreamChunk};
use crate::types::{Answer, ChatMessage};

/// Messages of history sent along with each question.
pub const HISTORY_WINDOW: usize = 20;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant answering questions about the \
     user's documents. Use the following pieces of retrieved context to answer the question. \
     If the context does not contain the answer, say that you don't know.";

/// A question-answering chain over a conversation.
#[async_trait]
pub trait QaChain: Send + Sync {
    /// Stream the answer to `question` given the conversation so far.
    async fn stream(&self, question: &str, history: &ChatHistory) -> Result<BoxedStream>;

    /// Answer `question` and record the exchange in `history`.
    async fn invoke(&self, question: &str, history: &mut ChatHistory) -> Result<Answer> {
        let stream = self.stream(question, history).await?;
        let content = collect_answer(stream).await?;
        history.add_exchange(question, &content);
        Ok(Answer { content })
    }
}

/// Drain a token stream into the full answer text.
pub async fn collect_answer(mut stream: BoxedStream) -> Result<String> {
    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            StreamChunk::Token(text) => content.push_str(&text),
            StreamChunk::Done { tokens_used } => {
                debug!("Answer complete after {} tokens", tokens_used);
                break;
            }
            StreamChunk::Error(e) => return Err(Error::Llm(e)),
        }
    }
    Ok(content)
}

/// Build the message array: system prompt with context, history, question.
pub fn build_messages(context: &[Fragment], history: &[ChatMessage], question: &str) -> Vec<ChatMessage> {
    let mut system = SYSTEM_PROMPT.to_string();
    if !context.is_empty() {
        let context_str = context
            .iter()
            .enumerate()
            .map(|(i, f)| format!("[{}] (source: {}): {}", i + 1, f.source, f.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        system.push_str("\n\nContext:\n");
        system.push_str(&context_str);
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question));
    messages
}

/// Retriever + LLM chain.
pub struct ConversationalChain {
    client: Client,
    retriever: Arc<dyn Retriever>,
    endpoint: String,
    model: String,
    api_key: String,
    sampling: Sampling,
}

impl ConversationalChain {
    pub fn new(client: Client, retriever: Arc<dyn Retriever>, llm: &LLMConfig, api_key: &str) -> Self {
        Self {
            client,
            retriever,
            endpoint: llm.endpoint(),
            model: llm.model.clone(),
            api_key: api_key.to_string(),
            sampling: Sampling {
                temperature: llm.temperature,
                max_tokens: llm.max_tokens,
            },
        }
    }
}

#[async_trait]
impl QaChain for ConversationalChain {
    async fn stream(&self, question: &str, history: &ChatHistory) -> Result<BoxedStream> {
        let context = self.retriever.retrieve(question).await?;
        debug!("Retrieved {} fragments for question", context.len());

        let messages = build_messages(&context, history.recent(HISTORY_WINDOW), question);
        Ok(providers::stream_llm(
            &self.client,
            &self.endpoint,
            messages,
            &self.model,
            &self.api_key,
            self.sampling,
        ))
    }
}

/// Hands out a chain plus the retriever it uses.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn get_chain(
        &self,
        openai_api_key: &str,
        huggingfacehub_api_token: &str,
    ) -> Result<(Arc<dyn QaChain>, Arc<dyn Retriever>)>;
}

/// Chains over the process-wide ensemble retriever.
pub struct RagChainProvider {
    client: Client,
    retrievers: Arc<RetrieverProvider>,
    llm: LLMConfig,
}

impl RagChainProvider {
    pub fn new(client: Client, retrievers: Arc<RetrieverProvider>, llm: LLMConfig) -> Self {
        Self {
            client,
            retrievers,
            llm,
        }
    }

    pub fn llm(&self) -> &LLMConfig {
        &self.llm
    }
}

#[async_trait]
impl ChainProvider for RagChainProvider {
    async fn get_chain(
        &self,
        openai_api_key: &str,
        huggingfacehub_api_token: &str,
    ) -> Result<(Arc<dyn QaChain>, Arc<dyn Retriever>)> {
        let retriever: Arc<dyn Retriever> = self.retrievers.get_retriever(openai_api_key).await?;
        let api_key = self.llm.api_key(openai_api_key, huggingfacehub_api_token);
        let chain = ConversationalChain::new(self.client.clone(), retriever.clone(), &self.llm, api_key);
        Ok((Arc::new(chain), retriever))
    }
}
