//! RAGChat: chat with a text corpus through a hosted LLM, with every answer
//! scored for relevancy and hallucination.

use std::sync::Arc;

use ragchat_chat::{LLMConfig, RagChainProvider};
use ragchat_core::{ProcessEnv, RagChatConfig};
use ragchat_eval::{JudgeConfig, JudgeEvaluator};
use ragchat_resolve::RetrieverProvider;
use ragchat_server::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Loads .env before anything else reads the environment.
    let config = RagChatConfig::from_env();
    let llm_config = LLMConfig::from_env()?;
    let judge_config = JudgeConfig::from_lookup(|key| std::env::var(key).ok());

    info!("Documents directory: {}", config.docs_dir.display());
    info!("LLM: {} ({})", llm_config.model, llm_config.provider);

    let mut client = reqwest::Client::builder();
    if let Some(timeout) = config.request_timeout {
        client = client.timeout(timeout);
    }
    let client = client.build()?;

    // Built lazily on the first ready session, then shared by all of them.
    let retrievers = Arc::new(RetrieverProvider::openai(
        client.clone(),
        config.openai_base_url.clone(),
        config.docs_dir.clone(),
        config.retrieval.clone(),
    ));
    let chains = Arc::new(RagChainProvider::new(client.clone(), retrievers, llm_config));
    let llm_config = chains.llm().clone();
    let evaluator = Arc::new(JudgeEvaluator::new(client, judge_config).with_verdict_tracing(false));
    let judge_model = evaluator.config().model.clone();

    let port = config.port;
    let state = Arc::new(AppState::new(
        config,
        llm_config,
        judge_model,
        chains,
        evaluator,
        Arc::new(ProcessEnv),
    ));

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("RAGChat server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
