//! Per-turn evaluation: re-query the retriever, score the answer, pull out
//! the two displayed scores.

use ragchat_core::Result;
use ragchat_resolve::Retriever;
use tracing::debug;

use crate::types::{EvaluationService, MetricKind, Scores, TestCase, TestResult};

const METRICS: [MetricKind; 2] = [MetricKind::AnswerRelevancy, MetricKind::Hallucination];

/// Score one answer. The retriever is queried again for the evaluation
/// context, independent of the retrieval the chain did.
pub async fn evaluate_answer(
    service: &dyn EvaluationService,
    retriever: &dyn Retriever,
    question: &str,
    answer: &str,
    api_key: &str,
) -> Result<Scores> {
    let context = retriever
        .retrieve(question)
        .await?
        .into_iter()
        .map(|f| f.text)
        .collect::<Vec<_>>();

    let case = TestCase {
        input: question.to_string(),
        actual_output: answer.to_string(),
        context,
    };

    let result = service.evaluate(std::slice::from_ref(&case), &METRICS, api_key).await?;
    let scores = result
        .test_results
        .first()
        .map(extract_scores)
        .unwrap_or_default();
    debug!("Evaluation scores: {:?}", scores);
    Ok(scores)
}

/// Match metric names case-insensitively; anything else is ignored.
pub fn extract_scores(result: &TestResult) -> Scores {
    let mut scores = Scores::default();
    for metric in &result.metrics_data {
        let name = metric.name.to_lowercase();
        if name == "answer relevancy" {
            scores.relevancy = metric.score;
        } else if name == "hallucination" {
            scores.hallucination = metric.score;
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ragchat_core::Error;
    use ragchat_resolve::Fragment;

    use crate::types::{EvaluationResult, MetricData};

    struct MenuRetriever;

    #[async_trait]
    impl Retriever for MenuRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Fragment>> {
            Ok(vec![
                Fragment {
                    chunk_id: 0,
                    source: "menu.txt".into(),
                    text: "Monday: lentil soup".into(),
                    score: 0.03,
                },
                Fragment {
                    chunk_id: 1,
                    source: "menu.txt".into(),
                    text: "Tuesday: tacos".into(),
                    score: 0.02,
                },
            ])
        }
    }

    fn metric(name: &str, score: f64) -> MetricData {
        MetricData {
            name: name.into(),
            score: Some(score),
            threshold: 0.5,
            success: true,
            reason: None,
        }
    }

    /// Records the case it saw and answers with fixed metric data.
    struct FixedService {
        metrics: Vec<MetricData>,
        seen: Mutex<Option<TestCase>>,
    }

    #[async_trait]
    impl EvaluationService for FixedService {
        async fn evaluate(
            &self,
            test_cases: &[TestCase],
            metrics: &[MetricKind],
            _api_key: &str,
        ) -> Result<EvaluationResult> {
            assert_eq!(metrics, &METRICS);
            *self.seen.lock() = test_cases.first().cloned();
            Ok(EvaluationResult {
                test_results: vec![TestResult {
                    input: test_cases[0].input.clone(),
                    metrics_data: self.metrics.clone(),
                }],
            })
        }
    }

    struct FailingService;

    #[async_trait]
    impl EvaluationService for FailingService {
        async fn evaluate(&self, _: &[TestCase], _: &[MetricKind], _: &str) -> Result<EvaluationResult> {
            Err(Error::Evaluation("judge unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_builds_case_from_retrieved_context() {
        let service = FixedService {
            metrics: vec![metric("Answer Relevancy", 0.9), metric("Hallucination", 0.1)],
            seen: Mutex::new(None),
        };
        let scores = evaluate_answer(&service, &MenuRetriever, "What's for dinner?", "Soup.", "sk")
            .await
            .unwrap();

        assert_eq!(scores.relevancy, Some(0.9));
        assert_eq!(scores.hallucination, Some(0.1));
        let seen = service.seen.lock().clone().unwrap();
        assert_eq!(seen.actual_output, "Soup.");
        assert_eq!(seen.context, vec!["Monday: lentil soup", "Tuesday: tacos"]);
    }

    #[test]
    fn test_extract_scores_ignores_unknown_names() {
        let result = TestResult {
            input: "q".into(),
            metrics_data: vec![
                metric("ANSWER RELEVANCY", 0.8),
                metric("Faithfulness", 0.3),
                metric("Answer Relevancy Extended", 0.1),
            ],
        };
        let scores = extract_scores(&result);
        assert_eq!(scores.relevancy, Some(0.8));
        assert_eq!(scores.hallucination, None);
    }

    #[tokio::test]
    async fn test_service_error_propagates() {
        let err = evaluate_answer(&FailingService, &MenuRetriever, "q", "a", "sk")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), Error::Evaluation("judge unavailable".into()).to_string());
    }
}
