//! Chat session controller.
//!
//! Every interaction is one render pass over a `SessionContext`:
//!
//! 1. Resolve both credentials. If either is missing the pass halts in
//!    `AwaitingCredentials` with a warning per missing key.
//! 2. Fetch the chain (building the shared retriever on first use) and seed
//!    the greeting.
//! 3. Append non-empty chat input as a user message.
//! 4. If the last message is the user's, answer it: invoke the chain, score
//!    the answer best-effort, append exactly one assistant message.
//!
//! Steps 1–3 live in [`Controller::begin`] and step 4 is split into
//! [`Controller::evaluate`] and [`Controller::finish`] so the streaming
//! route can interleave its own token delivery.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ragchat_chat::{ChainProvider, ChatMessage, QaChain};
use ragchat_core::{CredentialSpec, EnvSource, Result, HUGGINGFACEHUB_API_TOKEN, OPENAI_API_KEY};
use ragchat_eval::{evaluate_answer, EvaluationService, Scores};
use ragchat_resolve::Retriever;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::credentials::{self, CredentialPrompt, Resolution};
use crate::session::{SessionContext, Sidebar, SidebarMetric};

pub const TITLE: &str = "RAGChat";
pub const SUBHEADER: &str = "Ask me questions about this week's meal plan";
pub const GREETING: &str = "What would you like to know?";

const REQUIRED: [CredentialSpec; 2] = [OPENAI_API_KEY, HUGGINGFACEHUB_API_TOKEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    AwaitingCredentials,
    /// Last message is the assistant's.
    Idle,
    /// Last message is the user's.
    AwaitingResponse,
}

/// What the user submitted on this pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PassInput {
    #[serde(default)]
    pub chat_input: Option<String>,
    /// Values typed into credential prompts, by key.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

impl PassInput {
    pub fn chat(content: impl Into<String>) -> Self {
        Self {
            chat_input: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn credential(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(key.into(), value.into());
        Self {
            credentials,
            ..Self::default()
        }
    }
}

/// The rendered result of a pass.
#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub state: ControllerState,
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subheader: Option<&'static str>,
    pub messages: Vec<ChatMessage>,
    pub prompts: Vec<CredentialPrompt>,
    pub warnings: Vec<String>,
    pub sidebar: Sidebar,
}

/// An assistant turn that is due.
pub struct Turn {
    pub question: String,
    pub chain: Arc<dyn QaChain>,
    pub retriever: Arc<dyn Retriever>,
    openai_api_key: String,
}

pub enum Pass {
    /// Nothing left to do on this pass.
    Rendered(View),
    Due(Turn),
}

/// Build the sidebar for a turn's scores.
pub fn sidebar_for(scores: &Scores) -> Sidebar {
    let mut sidebar = Sidebar::default();
    if let Some(score) = scores.relevancy {
        sidebar.metrics.push(SidebarMetric {
            label: "Relevance ↗",
            value: format!("{:.2}", score),
        });
    }
    if let Some(score) = scores.hallucination {
        sidebar.metrics.push(SidebarMetric {
            label: "Hallucination ↘",
            value: format!("{:.2}", score),
        });
    }
    sidebar
}

pub struct Controller {
    chains: Arc<dyn ChainProvider>,
    evaluator: Arc<dyn EvaluationService>,
    env: Arc<dyn EnvSource>,
}

impl Controller {
    pub fn new(
        chains: Arc<dyn ChainProvider>,
        evaluator: Arc<dyn EvaluationService>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            chains,
            evaluator,
            env,
        }
    }

    /// Run one full pass.
    pub async fn run_pass(&self, session: &mut SessionContext, input: &PassInput) -> Result<View> {
        let turn = match self.begin(session, input).await? {
            Pass::Rendered(view) => return Ok(view),
            Pass::Due(turn) => turn,
        };

        let answer = turn.chain.invoke(&turn.question, &mut session.chat_history).await?;
        let sidebar = self.evaluate(&turn, &answer.content).await;
        Ok(self.finish(session, answer.content, sidebar))
    }

    /// Credentials, chain and input handling. Chain construction errors
    /// propagate.
    pub async fn begin(&self, session: &mut SessionContext, input: &PassInput) -> Result<Pass> {
        let mut prompts = Vec::new();
        let mut warnings = Vec::new();
        let mut values = Vec::with_capacity(REQUIRED.len());

        for spec in &REQUIRED {
            let submitted = input.credentials.get(spec.key).map(String::as_str);
            match credentials::resolve(session, spec, self.env.as_ref(), submitted) {
                Resolution::Resolved(value) => values.push(value),
                Resolution::Prompt(prompt) => {
                    prompts.push(prompt);
                    warnings.push(format!("Missing {}", spec.key));
                }
            }
        }

        if !warnings.is_empty() {
            let mut view = render(session, ControllerState::AwaitingCredentials);
            view.prompts = prompts;
            view.warnings = warnings;
            return Ok(Pass::Rendered(view));
        }

        let (chain, retriever) = self.chains.get_chain(&values[0], &values[1]).await?;
        session.seed_greeting(GREETING);

        if let Some(text) = input.chat_input.as_deref().filter(|t| !t.trim().is_empty()) {
            session.push_message(ChatMessage::user(text));
        }

        let Some(question) = session.pending_question().map(str::to_string) else {
            return Ok(Pass::Rendered(render(session, ControllerState::Idle)));
        };

        info!("Session {}: answering question", session.id);
        Ok(Pass::Due(Turn {
            question,
            chain,
            retriever,
            openai_api_key: values.swap_remove(0),
        }))
    }

    /// Score an answer. Never fails: errors become a sidebar message.
    pub async fn evaluate(&self, turn: &Turn, answer: &str) -> Sidebar {
        let scored = evaluate_answer(
            self.evaluator.as_ref(),
            turn.retriever.as_ref(),
            &turn.question,
            answer,
            &turn.openai_api_key,
        )
        .await;

        match scored {
            Ok(scores) => sidebar_for(&scores),
            Err(e) => {
                warn!("Evaluation failed: {}", e);
                Sidebar {
                    metrics: Vec::new(),
                    errors: vec![format!("Evaluation failed: {}", e)],
                }
            }
        }
    }

    /// Commit the answer and render the idle view.
    pub fn finish(&self, session: &mut SessionContext, answer: String, sidebar: Sidebar) -> View {
        session.push_message(ChatMessage::assistant(answer));
        session.sidebar = sidebar;
        render(session, ControllerState::Idle)
    }
}

/// Render the session as it stands.
pub fn render(session: &SessionContext, state: ControllerState) -> View {
    let ready = state != ControllerState::AwaitingCredentials;
    View {
        session_id: session.id.clone(),
        created_at: session.created_at,
        state,
        title: TITLE,
        subheader: ready.then_some(SUBHEADER),
        messages: session.messages().to_vec(),
        prompts: Vec::new(),
        warnings: Vec::new(),
        sidebar: session.sidebar.clone(),
    }
}
