//! Runs a toy agent over a handful of prompts, traces every run to LangSmith
//! and, when tracing is on, turns the answers into a dataset and grades a
//! replay against it.
//!
//! ```text
//! TRACING_ENABLED=true TRACING_API_KEY=... cargo run -p smithrun-demos --bin walkthrough
//! ```
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use smithrun_core::{
    dispatch_traced, from_fn, BatchOptions, CallbackManager, Outcome, RunConfig, SmithrunError,
};
use smithrun_langsmith::{
    examples_from_outcomes, run_on_dataset, DatasetStore, EvaluationError, EvaluationInput,
    Evaluator, Feedback, LangSmithClient, LangSmithConfig, LangSmithTracer, RunEvalConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

// Stand-in for a model call.
async fn answer(prompt: String) -> Result<String, SmithrunError> {
    tokio::time::sleep(Duration::from_millis(20 * prompt.len() as u64 % 200)).await;
    match prompt.as_str() {
        "What is the capital of France?" => Ok("Paris".to_string()),
        "How many legs does a spider have?" => Ok("8".to_string()),
        "Who wrote Hamlet?" => Ok("William Shakespeare".to_string()),
        _ => Err(SmithrunError::ToolCallFailed {
            tool_name: "search".to_string(),
            reason: format!("no results for {prompt:?}"),
        }),
    }
}

struct ExactMatch;

#[async_trait]
impl Evaluator for ExactMatch {
    async fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Feedback, EvaluationError> {
        let expected = input
            .example
            .reference_output()
            .ok_or_else(|| EvaluationError::Grading("example has no reference output".into()))?;
        let matched = expected.trim().eq_ignore_ascii_case(input.prediction.trim());
        Ok(Feedback::score("exact_match", if matched { 1.0 } else { 0.0 }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LangSmithConfig::from_env().context("invalid tracing configuration")?;
    let tracer = Arc::new(LangSmithTracer::new(config.clone()));
    info!(
        enabled = tracer.is_enabled(),
        project = tracer.project_name(),
        "tracer ready"
    );

    let agent = from_fn(answer);
    let prompts = vec![
        "What is the capital of France?".to_string(),
        "How many legs does a spider have?".to_string(),
        "What is the airspeed of an unladen swallow?".to_string(),
        "Who wrote Hamlet?".to_string(),
    ];

    let mut run_config = RunConfig::with_callbacks(CallbackManager::new(vec![tracer.clone()]));
    run_config.name_override = Some("trivia_agent".to_string());
    run_config.tags.push("walkthrough".to_string());

    let outcomes = dispatch_traced(
        &agent,
        prompts.clone(),
        &BatchOptions::bounded(2),
        &run_config,
    )
    .await;

    for (prompt, outcome) in prompts.iter().zip(&outcomes) {
        match outcome {
            Outcome::Success(answer) => println!("ok   {prompt} -> {answer}"),
            Outcome::Failure(err) => println!("fail {prompt} -> {err}"),
        }
    }

    let stats = tracer.flush(FLUSH_TIMEOUT).await?;
    println!(
        "flushed {} events in {} batches ({} failed, {} dropped)",
        stats.events_flushed, stats.batches_sent, stats.events_failed, stats.dropped_events
    );

    if !tracer.is_enabled() {
        println!("tracing disabled; set TRACING_ENABLED=true to create a dataset and evaluate");
        return Ok(());
    }

    let client = LangSmithClient::from_config(&config);
    let dataset = client
        .create_dataset(
            &format!("walkthrough-{}", uuid::Uuid::new_v4()),
            Some("answers recorded by the walkthrough demo"),
        )
        .await?;
    let examples = client
        .create_examples(dataset.id, &examples_from_outcomes(&prompts, &outcomes))
        .await?;
    info!(dataset = %dataset.id, examples = examples.len(), "dataset created");

    let eval_config = RunEvalConfig {
        evaluators: vec![Arc::new(ExactMatch)],
        batch: BatchOptions::bounded(2),
        tracer: Some(tracer.clone()),
        ..Default::default()
    };
    let results = run_on_dataset(&agent, &client, &client, dataset.id, &eval_config).await?;

    let summary = &results.summary;
    println!(
        "replayed {} examples: {} succeeded, {} failed",
        summary.total, summary.succeeded, summary.failed
    );
    for (key, stats) in &summary.feedback {
        match stats.mean {
            Some(mean) => println!("  {key}: mean {mean:.2} over {} runs", stats.scored),
            None => println!("  {key}: {} unscored", stats.count),
        }
    }

    tracer.shutdown(FLUSH_TIMEOUT).await?;
    Ok(())
}
