//! Credential definitions and environment access.
//!
//! The resolver that walks session → environment → prompt lives with the
//! session state in the server; this module only describes the secrets and
//! how the environment is read.

use std::collections::HashMap;

use serde::Serialize;

/// A secret the chat session needs before it can answer questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialSpec {
    /// Environment variable name, also used as the session key.
    pub key: &'static str,
    /// Label shown on the masked input prompt.
    pub display_name: &'static str,
    /// Where to obtain the secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_link: Option<&'static str>,
}

pub const OPENAI_API_KEY: CredentialSpec = CredentialSpec {
    key: "OPENAI_API_KEY",
    display_name: "OpenAI API key",
    info_link: Some("https://platform.openai.com/account/api-keys"),
};

pub const HUGGINGFACEHUB_API_TOKEN: CredentialSpec = CredentialSpec {
    key: "HUGGINGFACEHUB_API_TOKEN",
    display_name: "HuggingFace Hub API Token",
    info_link: Some(
        "https://huggingface.co/docs/huggingface_hub/main/en/quick-start#authentication",
    ),
};

/// A credential value that is empty or only whitespace counts as absent.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Source of environment variables.
pub trait EnvSource: Send + Sync {
    /// Non-blank value of `key`, if defined.
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !is_blank(v))
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).filter(|v| !is_blank(v)).cloned()
    }
}
