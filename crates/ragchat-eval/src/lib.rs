//! Answer evaluation.
//!
//! An `EvaluationService` scores test cases against named metrics. The
//! shipped service is `JudgeEvaluator`, which asks an LLM for per-statement
//! and per-context verdicts. `evaluate_answer` is the per-turn adapter used
//! by the chat loop.

pub mod adapter;
pub mod judge;
pub mod types;

pub use adapter::{evaluate_answer, extract_scores};
pub use judge::{JudgeConfig, JudgeEvaluator};
pub use types::*;
