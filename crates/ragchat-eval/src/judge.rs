//! LLM-as-judge evaluation service.
//!
//! Each metric is one JSON-mode completion. The judge returns a list of
//! verdicts and the score is a simple ratio over them:
//!
//! - Answer Relevancy: one verdict per statement of the answer
//!   (`yes`/`no`/`idk`); score = non-`no` verdicts / total.
//! - Hallucination: one verdict per context fragment (`yes` when the answer
//!   agrees with it); score = `no` verdicts / total.

use async_trait::async_trait;
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use ragchat_chat::providers::{self, Sampling};
use ragchat_chat::ChatMessage;
use ragchat_core::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::types::{EvaluationResult, EvaluationService, MetricData, MetricKind, TestCase, TestResult};

pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_THRESHOLD: f64 = 0.5;

const JUDGE_SAMPLING: Sampling = Sampling {
    temperature: 0.0,
    max_tokens: 1024,
};

const RELEVANCY_PROMPT: &str = "Break the actual output into individual statements. For each \
     statement decide whether it is relevant to addressing the input. Answer 'yes' if it is, \
     'no' if it is not, and 'idk' if it is ambiguous or supporting information. Respond with a \
     JSON object of the form {\"verdicts\": [{\"verdict\": \"yes\", \"reason\": \"...\"}]}, \
     one entry per statement, in order.";

const HALLUCINATION_PROMPT: &str = "For each numbered context, decide whether the actual output \
     agrees with it. Answer 'yes' if it agrees or does not contradict it and 'no' if it \
     contradicts it. Respond with a JSON object of the form {\"verdicts\": [{\"verdict\": \
     \"yes\", \"reason\": \"...\"}]}, exactly one entry per context, in order.";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("valid regex"));

/// One judge verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub verdict: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Verdict {
    fn is_no(&self) -> bool {
        self.verdict.trim().eq_ignore_ascii_case("no")
    }
}

#[derive(Debug, Deserialize)]
struct Verdicts {
    verdicts: Vec<Verdict>,
}

/// Parse the judge's reply, tolerating a markdown code fence around it.
pub fn parse_verdicts(raw: &str) -> Result<Vec<Verdict>> {
    let body = CODE_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str());
    let parsed: Verdicts = serde_json::from_str(body.trim())
        .map_err(|e| Error::Evaluation(format!("judge returned malformed verdicts: {}", e)))?;
    Ok(parsed.verdicts)
}

/// Share of statements not judged irrelevant. No statements scores 1.0.
pub fn relevancy_score(verdicts: &[Verdict]) -> f64 {
    if verdicts.is_empty() {
        return 1.0;
    }
    let relevant = verdicts.iter().filter(|v| !v.is_no()).count();
    relevant as f64 / verdicts.len() as f64
}

/// Share of contexts the output contradicts. No contexts scores 0.0.
pub fn hallucination_score(verdicts: &[Verdict]) -> f64 {
    if verdicts.is_empty() {
        return 0.0;
    }
    let contradicted = verdicts.iter().filter(|v| v.is_no()).count();
    contradicted as f64 / verdicts.len() as f64
}

/// Judge model settings.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub model: String,
    pub base_url: String,
    pub threshold: f64,
    /// Log raw judge verdicts at debug level.
    pub trace_verdicts: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_JUDGE_MODEL.into(),
            base_url: ragchat_core::config::DEFAULT_OPENAI_BASE_URL.into(),
            threshold: DEFAULT_THRESHOLD,
            trace_verdicts: true,
        }
    }
}

impl JudgeConfig {
    /// Read `RAGCHAT_JUDGE_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            model: lookup("RAGCHAT_JUDGE_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.model),
            base_url: lookup("OPENAI_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            ..defaults
        }
    }
}

/// Scores answers by asking an OpenAI-compatible model for verdicts.
pub struct JudgeEvaluator {
    client: Client,
    config: JudgeConfig,
}

impl JudgeEvaluator {
    pub fn new(client: Client, config: JudgeConfig) -> Self {
        Self { client, config }
    }

    /// Turn raw verdict logging on or off.
    pub fn with_verdict_tracing(mut self, enabled: bool) -> Self {
        self.config.trace_verdicts = enabled;
        self
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    async fn judge(&self, metric: MetricKind, prompt: String, api_key: &str) -> Result<Vec<Verdict>> {
        let messages = [
            ChatMessage::system("You are a strict evaluator of question-answering systems."),
            ChatMessage::user(prompt),
        ];
        let endpoint = format!("{}/chat/completions", self.config.base_url);
        let raw = providers::complete(
            &self.client,
            &endpoint,
            &messages,
            &self.config.model,
            api_key,
            JUDGE_SAMPLING,
            true,
        )
        .await
        .map_err(|e| Error::Evaluation(format!("{} judge call failed: {}", metric.name(), e)))?;

        if self.config.trace_verdicts {
            debug!("{} verdicts: {}", metric.name(), raw);
        }
        parse_verdicts(&raw)
    }

    async fn measure(&self, case: &TestCase, metric: MetricKind, api_key: &str) -> Result<MetricData> {
        let threshold = self.config.threshold;
        let (score, reason) = match metric {
            MetricKind::AnswerRelevancy => {
                let prompt = format!(
                    "{}\n\nInput:\n{}\n\nActual output:\n{}",
                    RELEVANCY_PROMPT, case.input, case.actual_output
                );
                let verdicts = self.judge(metric, prompt, api_key).await?;
                let irrelevant = verdicts.iter().filter(|v| v.is_no()).count();
                (
                    relevancy_score(&verdicts),
                    format!("{} of {} statements irrelevant", irrelevant, verdicts.len()),
                )
            }
            MetricKind::Hallucination if case.context.is_empty() => {
                (0.0, "no context to contradict".to_string())
            }
            MetricKind::Hallucination => {
                let contexts = case
                    .context
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("[{}] {}", i + 1, c))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let prompt = format!(
                    "{}\n\nContexts:\n{}\n\nActual output:\n{}",
                    HALLUCINATION_PROMPT, contexts, case.actual_output
                );
                let verdicts = self.judge(metric, prompt, api_key).await?;
                let contradicted = verdicts.iter().filter(|v| v.is_no()).count();
                (
                    hallucination_score(&verdicts),
                    format!("{} of {} contexts contradicted", contradicted, verdicts.len()),
                )
            }
        };

        let success = match metric {
            MetricKind::AnswerRelevancy => score >= threshold,
            MetricKind::Hallucination => score <= threshold,
        };

        Ok(MetricData {
            name: metric.name().to_string(),
            score: Some(score),
            threshold,
            success,
            reason: Some(reason),
        })
    }
}

#[async_trait]
impl EvaluationService for JudgeEvaluator {
    async fn evaluate(
        &self,
        test_cases: &[TestCase],
        metrics: &[MetricKind],
        api_key: &str,
    ) -> Result<EvaluationResult> {
        if api_key.trim().is_empty() {
            return Err(Error::MissingCredential("OPENAI_API_KEY".into()));
        }

        let mut test_results = Vec::with_capacity(test_cases.len());
        for case in test_cases {
            let metrics_data =
                try_join_all(metrics.iter().map(|m| self.measure(case, *m, api_key))).await?;
            test_results.push(TestResult {
                input: case.input.clone(),
                metrics_data,
            });
        }
        Ok(EvaluationResult { test_results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdicts(values: &[&str]) -> Vec<Verdict> {
        values
            .iter()
            .map(|v| Verdict {
                verdict: v.to_string(),
                reason: None,
            })
            .collect()
    }

    fn completion(content: serde_json::Value) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content.to_string()}}]})
            .to_string()
    }

    fn case() -> TestCase {
        TestCase {
            input: "What's for dinner?".into(),
            actual_output: "Lentil soup, then fruit.".into(),
            context: vec!["Monday: lentil soup".into(), "Dessert is fruit".into()],
        }
    }

    #[test]
    fn test_scores() {
        assert_eq!(relevancy_score(&verdicts(&["yes", "idk", "no", "Yes"])), 0.75);
        assert_eq!(relevancy_score(&[]), 1.0);
        assert_eq!(hallucination_score(&verdicts(&["yes", "NO"])), 0.5);
        assert_eq!(hallucination_score(&[]), 0.0);
    }

    #[test]
    fn test_parse_verdicts_with_code_fence() {
        let raw = "```json\n{\"verdicts\": [{\"verdict\": \"yes\"}, {\"verdict\": \"no\", \"reason\": \"off topic\"}]}\n```";
        let parsed = parse_verdicts(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].reason.as_deref(), Some("off topic"));

        assert!(matches!(parse_verdicts("not json"), Err(Error::Evaluation(_))));
    }

    #[tokio::test]
    async fn test_evaluate_both_metrics() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("individual statements".into()))
            .with_status(200)
            .with_body(completion(json!({"verdicts": [{"verdict": "yes"}, {"verdict": "no"}]})))
            .create_async()
            .await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("numbered context".into()))
            .with_status(200)
            .with_body(completion(json!({"verdicts": [{"verdict": "yes"}, {"verdict": "yes"}]})))
            .create_async()
            .await;

        let judge = JudgeEvaluator::new(
            Client::new(),
            JudgeConfig {
                base_url: server.url(),
                ..JudgeConfig::default()
            },
        )
        .with_verdict_tracing(false);

        let result = judge
            .evaluate(&[case()], &[MetricKind::AnswerRelevancy, MetricKind::Hallucination], "sk-test")
            .await
            .unwrap();

        let data = &result.test_results[0].metrics_data;
        assert_eq!(data[0].name, "Answer Relevancy");
        assert_eq!(data[0].score, Some(0.5));
        assert!(data[0].success);
        assert_eq!(data[1].name, "Hallucination");
        assert_eq!(data[1].score, Some(0.0));
        assert!(data[1].success);
    }

    #[tokio::test]
    async fn test_judge_error_fails_evaluation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let judge = JudgeEvaluator::new(
            Client::new(),
            JudgeConfig {
                base_url: server.url(),
                ..JudgeConfig::default()
            },
        );
        let err = judge
            .evaluate(&[case()], &[MetricKind::AnswerRelevancy], "sk-test")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Evaluation(ref msg) if msg.contains("Answer Relevancy")));
    }

    #[tokio::test]
    async fn test_empty_key_is_missing_credential() {
        let judge = JudgeEvaluator::new(Client::new(), JudgeConfig::default());
        let err = judge
            .evaluate(&[case()], &[MetricKind::Hallucination], " ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential(_)));
    }
}
