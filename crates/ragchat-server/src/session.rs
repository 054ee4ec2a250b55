//! Per-session state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ragchat_chat::{ChatHistory, ChatMessage, Role};
use ragchat_core::{is_blank, Error, Result, HUGGINGFACEHUB_API_TOKEN, OPENAI_API_KEY};
use serde::Serialize;

/// One labelled score shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebarMetric {
    pub label: &'static str,
    /// Score formatted with two decimals.
    pub value: String,
}

/// Sidebar content produced by the last answered turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sidebar {
    pub metrics: Vec<SidebarMetric>,
    pub errors: Vec<String>,
}

/// Everything one browser session owns.
#[derive(Debug)]
pub struct SessionContext {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub openai_api_key: Option<String>,
    pub huggingfacehub_api_token: Option<String>,
    /// Memory the chain reads and appends to.
    pub chat_history: ChatHistory,
    pub sidebar: Sidebar,
    messages: Vec<ChatMessage>,
}

impl SessionContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            openai_api_key: None,
            huggingfacehub_api_token: None,
            chat_history: ChatHistory::new(),
            sidebar: Sidebar::default(),
            messages: Vec::new(),
        }
    }

    /// The stored value of a credential, if non-blank.
    pub fn credential(&self, key: &str) -> Option<&str> {
        let value = match key {
            k if k == OPENAI_API_KEY.key => self.openai_api_key.as_deref(),
            k if k == HUGGINGFACEHUB_API_TOKEN.key => self.huggingfacehub_api_token.as_deref(),
            _ => None,
        };
        value.filter(|v| !is_blank(v))
    }

    /// Store a credential. Keys other than the two known ones are rejected.
    pub fn set_credential(&mut self, key: &str, value: String) -> Result<()> {
        let slot = match key {
            k if k == OPENAI_API_KEY.key => &mut self.openai_api_key,
            k if k == HUGGINGFACEHUB_API_TOKEN.key => &mut self.huggingfacehub_api_token,
            other => return Err(Error::Config(format!("Unknown credential: {}", other))),
        };
        *slot = Some(value);
        Ok(())
    }

    /// The transcript, oldest first. Append-only.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Seed the transcript with a greeting the first time it is shown.
    pub fn seed_greeting(&mut self, greeting: &str) {
        if self.messages.is_empty() {
            self.messages.push(ChatMessage::assistant(greeting));
        }
    }

    /// The question awaiting an answer: the last message when it is the user's.
    pub fn pending_question(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<SessionContext>>;

/// In-memory sessions keyed by id. Passes for one session are serialized by
/// its mutex; sessions never expire.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> SessionHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let handle = Arc::new(tokio::sync::Mutex::new(SessionContext::new(id.clone())));
        self.sessions.write().insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_seeded_once() {
        let mut session = SessionContext::new("s");
        session.seed_greeting("hello");
        session.push_message(ChatMessage::user("q"));
        session.seed_greeting("hello");

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.pending_question(), Some("q"));

        session.push_message(ChatMessage::assistant("a"));
        assert_eq!(session.pending_question(), None);
    }

    #[test]
    fn test_credentials() {
        let mut session = SessionContext::new("s");
        session.set_credential("OPENAI_API_KEY", "sk".into()).unwrap();
        session.set_credential("HUGGINGFACEHUB_API_TOKEN", "  ".into()).unwrap();

        assert_eq!(session.credential("OPENAI_API_KEY"), Some("sk"));
        assert_eq!(session.credential("HUGGINGFACEHUB_API_TOKEN"), None);
        assert!(session.set_credential("AWS_SECRET", "x".into()).is_err());
    }

    #[tokio::test]
    async fn test_store_lookup() {
        let store = SessionStore::new();
        let handle = store.create();
        let id = handle.lock().await.id.clone();

        assert!(Arc::ptr_eq(&store.get(&id).unwrap(), &handle));
        assert!(store.get("missing").is_none());
        assert_eq!(store.len(), 1);
    }
}
