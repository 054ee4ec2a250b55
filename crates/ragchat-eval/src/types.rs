//! Evaluation types.

use async_trait::async_trait;
use ragchat_core::Result;
use serde::{Deserialize, Serialize};

/// One question/answer/context triple to score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub actual_output: String,
    #[serde(default)]
    pub context: Vec<String>,
}

/// Metrics the evaluator knows how to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    AnswerRelevancy,
    Hallucination,
}

impl MetricKind {
    /// Display name reported in results.
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::AnswerRelevancy => "Answer Relevancy",
            MetricKind::Hallucination => "Hallucination",
        }
    }
}

/// Outcome of one metric on one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricData {
    pub name: String,
    pub score: Option<f64>,
    pub threshold: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// All metric outcomes for one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub input: String,
    pub metrics_data: Vec<MetricData>,
}

/// Outcome of one evaluation run, one entry per test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub test_results: Vec<TestResult>,
}

/// Scores pulled out of an evaluation for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Scores {
    pub relevancy: Option<f64>,
    pub hallucination: Option<f64>,
}

/// Scores test cases against named metrics.
#[async_trait]
pub trait EvaluationService: Send + Sync {
    /// `api_key` authenticates the evaluator's own model calls.
    async fn evaluate(
        &self,
        test_cases: &[TestCase],
        metrics: &[MetricKind],
        api_key: &str,
    ) -> Result<EvaluationResult>;
}
