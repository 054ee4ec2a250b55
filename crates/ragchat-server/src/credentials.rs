//! Credential resolution: session, then environment, then a masked prompt.

use ragchat_core::{is_blank, CredentialSpec, EnvSource};
use serde::Serialize;
use tracing::{debug, warn};

use crate::session::SessionContext;

/// A masked input the page should show for a missing secret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialPrompt {
    pub key: &'static str,
    pub label: &'static str,
    /// "Please provide your <label>"
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_link: Option<&'static str>,
    pub masked: bool,
}

impl CredentialPrompt {
    fn for_spec(spec: &CredentialSpec) -> Self {
        Self {
            key: spec.key,
            label: spec.display_name,
            message: format!("Please provide your {}", spec.display_name),
            info_link: spec.info_link,
            masked: true,
        }
    }
}

/// Outcome of resolving one credential for a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(String),
    Prompt(CredentialPrompt),
}

impl Resolution {
    pub fn value(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(v) => Some(v.as_str()),
            Resolution::Prompt(_) => None,
        }
    }
}

/// Resolve `spec` for this pass. `submitted` is what the user typed into
/// the prompt, if anything. A stored value is never overwritten.
pub fn resolve(
    session: &mut SessionContext,
    spec: &CredentialSpec,
    env: &dyn EnvSource,
    submitted: Option<&str>,
) -> Resolution {
    if let Some(value) = session.credential(spec.key) {
        return Resolution::Resolved(value.to_string());
    }

    let (value, origin) = match env.get(spec.key) {
        Some(v) => (v, "environment"),
        None => match submitted.filter(|s| !is_blank(s)) {
            Some(s) => (s.to_string(), "prompt"),
            None => return Resolution::Prompt(CredentialPrompt::for_spec(spec)),
        },
    };

    if let Err(e) = session.set_credential(spec.key, value.clone()) {
        warn!("Could not store {}: {}", spec.key, e);
    }
    debug!("Resolved {} from {}", spec.key, origin);
    Resolution::Resolved(value)
}
