//! LLM configuration and provider selection.

use ragchat_core::{Error, Result};
use serde::Serialize;

use crate::types::LLMProvider;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_HUGGINGFACE_MODEL: &str = "HuggingFaceH4/zephyr-7b-beta";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_HUGGINGFACE_BASE_URL: &str = "https://router.huggingface.co/v1";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: usize = 1024;

/// Which model answers questions and where it is served.
#[derive(Debug, Clone, Serialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub model: String,
    pub openai_base_url: String,
    pub huggingface_base_url: String,
    pub temperature: f64,
    pub max_tokens: usize,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            model: DEFAULT_OPENAI_MODEL.into(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            huggingface_base_url: DEFAULT_HUGGINGFACE_BASE_URL.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl LLMConfig {
    /// Read `RAGCHAT_LLM_*`, `OPENAI_BASE_URL` and `HF_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let provider = match non_empty(lookup("RAGCHAT_LLM_PROVIDER")) {
            Some(p) => p.parse::<LLMProvider>().map_err(Error::Config)?,
            None => defaults.provider,
        };

        let model = non_empty(lookup("RAGCHAT_LLM_MODEL")).unwrap_or_else(|| match provider {
            LLMProvider::OpenAI => DEFAULT_OPENAI_MODEL.into(),
            LLMProvider::HuggingFace => DEFAULT_HUGGINGFACE_MODEL.into(),
        });

        Ok(Self {
            provider,
            model,
            openai_base_url: non_empty(lookup("OPENAI_BASE_URL"))
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            huggingface_base_url: non_empty(lookup("HF_BASE_URL"))
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.huggingface_base_url),
            temperature: lookup("RAGCHAT_TEMPERATURE")
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: lookup("RAGCHAT_MAX_TOKENS")
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(defaults.max_tokens),
        })
    }

    /// Chat-completions endpoint of the configured provider.
    pub fn endpoint(&self) -> String {
        let base = match self.provider {
            LLMProvider::OpenAI => &self.openai_base_url,
            LLMProvider::HuggingFace => &self.huggingface_base_url,
        };
        format!("{}/chat/completions", base)
    }

    /// Pick the credential the configured provider authenticates with.
    pub fn api_key<'a>(&self, openai_api_key: &'a str, huggingfacehub_api_token: &'a str) -> &'a str {
        match self.provider {
            LLMProvider::OpenAI => openai_api_key,
            LLMProvider::HuggingFace => huggingfacehub_api_token,
        }
    }
}
