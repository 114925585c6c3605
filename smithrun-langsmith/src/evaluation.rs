//! Replays an operation over a dataset and grades every replay.
//!
//! Grading logic lives behind [`Evaluator`]; this module only sequences
//! listing, replay, grading and feedback upload.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smithrun_core::callbacks::CallbackHandler;
use smithrun_core::{dispatch_in_contexts, BatchOptions, Outcome, RunConfig, Runnable};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{DatasetStore, Example, LangSmithError, LangSmithTracer};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub key: String,
    pub score: Option<f64>,
    pub value: Option<Value>,
    pub comment: Option<String>,
}

impl Feedback {
    pub fn score(key: impl Into<String>, score: f64) -> Self {
        Self {
            key: key.into(),
            score: Some(score),
            value: None,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("langsmith request failed: {0}")]
    Store(#[from] LangSmithError),
    #[error("grading failed: {0}")]
    Grading(String),
}

/// What an evaluator sees for one successful replay.
#[derive(Clone, Copy, Debug)]
pub struct EvaluationInput<'a> {
    pub run_id: Uuid,
    pub example: &'a Example,
    pub prediction: &'a str,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Feedback, EvaluationError>;
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn create_feedback(&self, run_id: Uuid, feedback: &Feedback)
        -> Result<(), LangSmithError>;
}

pub struct RunEvalConfig {
    pub evaluators: Vec<Arc<dyn Evaluator>>,
    pub batch: BatchOptions,
    pub run_config: RunConfig,
    /// Registered as a callback (once, even if `run_config` already holds it)
    /// and flushed before feedback is uploaded, so feedback never references
    /// a run the service has not seen.
    pub tracer: Option<Arc<LangSmithTracer>>,
    pub flush_timeout: Duration,
}

impl Default for RunEvalConfig {
    fn default() -> Self {
        Self {
            evaluators: Vec::new(),
            batch: BatchOptions::default(),
            run_config: RunConfig::default(),
            tracer: None,
            flush_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct ExampleResult {
    pub example_id: Uuid,
    pub run_id: Uuid,
    pub outcome: Outcome<String>,
    pub feedback: Vec<Feedback>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedbackStats {
    pub count: usize,
    pub scored: usize,
    pub mean: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub grading_errors: usize,
    pub upload_errors: usize,
    pub feedback: BTreeMap<String, FeedbackStats>,
}

#[derive(Debug)]
pub struct EvaluationResults {
    pub dataset_id: Uuid,
    pub results: Vec<ExampleResult>,
    pub summary: EvaluationSummary,
}

#[derive(Default)]
struct GradeReport {
    feedback: Vec<Feedback>,
    grading_errors: usize,
    upload_errors: usize,
}

/// Replays `operation` over every example in `dataset_id`, grades each
/// successful replay and attaches the feedback to its run.
pub async fn run_on_dataset<R>(
    operation: &R,
    datasets: &dyn DatasetStore,
    feedback_store: &dyn FeedbackStore,
    dataset_id: Uuid,
    config: &RunEvalConfig,
) -> Result<EvaluationResults, EvaluationError>
where
    R: Runnable<String, String> + ?Sized,
{
    let examples = datasets.list_examples(dataset_id).await?;
    debug!(%dataset_id, examples = examples.len(), "replaying dataset");

    let mut callbacks = config.run_config.callbacks();
    if let Some(tracer) = &config.tracer {
        let tracer = tracer.clone() as Arc<dyn CallbackHandler>;
        if !callbacks.contains(&tracer) {
            callbacks.add_handler(tracer);
        }
    }

    let items: Vec<_> = examples
        .iter()
        .map(|example| {
            let ctx = config
                .run_config
                .root_context()
                .with_reference_example(example.id);
            (ctx, example.input_text().into_owned())
        })
        .collect();
    let run_ids: Vec<Uuid> = items.iter().map(|(ctx, _)| ctx.run_id).collect();

    let outcomes = dispatch_in_contexts(operation, items, &config.batch, &callbacks).await;

    if let Some(tracer) = &config.tracer {
        if let Err(err) = tracer.flush(config.flush_timeout).await {
            warn!(error = %err, "replay runs not fully flushed before grading");
        }
    }

    let reports = join_all(
        examples
            .iter()
            .zip(&run_ids)
            .zip(&outcomes)
            .map(|((example, run_id), outcome)| {
                grade(*run_id, example, outcome, &config.evaluators, feedback_store)
            }),
    )
    .await;

    let results: Vec<ExampleResult> = examples
        .iter()
        .zip(run_ids)
        .zip(outcomes)
        .zip(reports.iter())
        .map(|(((example, run_id), outcome), report)| ExampleResult {
            example_id: example.id,
            run_id,
            outcome,
            feedback: report.feedback.clone(),
        })
        .collect();

    let mut summary = EvaluationSummary::from_results(&results);
    summary.grading_errors = reports.iter().map(|report| report.grading_errors).sum();
    summary.upload_errors = reports.iter().map(|report| report.upload_errors).sum();

    Ok(EvaluationResults {
        dataset_id,
        results,
        summary,
    })
}

async fn grade(
    run_id: Uuid,
    example: &Example,
    outcome: &Outcome<String>,
    evaluators: &[Arc<dyn Evaluator>],
    feedback_store: &dyn FeedbackStore,
) -> GradeReport {
    let mut report = GradeReport::default();
    let Some(prediction) = outcome.success() else {
        return report;
    };
    let input = EvaluationInput {
        run_id,
        example,
        prediction,
    };

    for evaluator in evaluators {
        let feedback = match evaluator.evaluate(&input).await {
            Ok(feedback) => feedback,
            Err(err) => {
                report.grading_errors += 1;
                warn!(%run_id, example_id = %example.id, error = %err, "evaluator failed");
                continue;
            }
        };
        if let Err(err) = feedback_store.create_feedback(run_id, &feedback).await {
            report.upload_errors += 1;
            warn!(%run_id, key = %feedback.key, error = %err, "failed to upload feedback");
        }
        report.feedback.push(feedback);
    }
    report
}

impl EvaluationSummary {
    /// Counts outcomes and averages scores per feedback key.
    pub fn from_results(results: &[ExampleResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Default::default()
        };
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();

        for result in results {
            if result.outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            for feedback in &result.feedback {
                let stats = summary.feedback.entry(feedback.key.clone()).or_default();
                stats.count += 1;
                if let Some(score) = feedback.score {
                    stats.scored += 1;
                    *totals.entry(feedback.key.clone()).or_default() += score;
                }
            }
        }

        for (key, stats) in summary.feedback.iter_mut() {
            if stats.scored > 0 {
                let total = totals.get(key).copied().unwrap_or_default();
                stats.mean = Some(total / stats.scored as f64);
            }
        }
        summary
    }
}
