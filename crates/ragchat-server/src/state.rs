//! Shared application state.

use std::sync::Arc;

use ragchat_chat::{ChainProvider, LLMConfig};
use ragchat_core::{EnvSource, RagChatConfig};
use ragchat_eval::EvaluationService;

use crate::controller::Controller;
use crate::session::SessionStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: RagChatConfig,
    pub llm_config: LLMConfig,
    pub judge_model: String,
    pub controller: Controller,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        config: RagChatConfig,
        llm_config: LLMConfig,
        judge_model: String,
        chains: Arc<dyn ChainProvider>,
        evaluator: Arc<dyn EvaluationService>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            config,
            llm_config,
            judge_model,
            controller: Controller::new(chains, evaluator, env),
            sessions: SessionStore::new(),
        }
    }
}
