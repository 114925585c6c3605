//! LangSmith tracing, datasets and evaluation for smithrun operations.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use secrecy::SecretString;
//! use smithrun_core::{dispatch_traced, from_fn, BatchOptions, CallbackManager, RunConfig, SmithrunError};
//! use smithrun_langsmith::{LangSmithConfig, LangSmithTracer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LangSmithConfig::new(SecretString::new("key".to_string()), "example");
//!     let tracer = Arc::new(LangSmithTracer::new(config));
//!     let run_config = RunConfig::with_callbacks(CallbackManager::new(vec![tracer.clone()]));
//!
//!     let agent = from_fn(|prompt: String| async move { Ok::<_, SmithrunError>(prompt.to_uppercase()) });
//!     let prompts = vec!["what is the weather?".to_string()];
//!     let outcomes = dispatch_traced(&agent, prompts, &BatchOptions::default(), &run_config).await;
//!     assert_eq!(outcomes.len(), 1);
//!
//!     let _ = tracer.flush(Duration::from_secs(5)).await;
//! }
//! ```
mod client;
mod config;
mod dataset;
mod evaluation;
mod events;
mod exporter;
mod run_store;
mod sampler;
mod sanitize;
mod sink;
mod tracer;

pub use client::{LangSmithClient, LangSmithError};
pub use config::{
    ConfigError, LangSmithConfig, DEFAULT_API_URL, DEFAULT_PROJECT, DEFAULT_REQUEST_TIMEOUT,
    ENV_API_KEY, ENV_ENDPOINT, ENV_PROJECT, ENV_TRACING_ENABLED,
};
pub use dataset::{examples_from_outcomes, Dataset, DatasetStore, Example, NewExample, INPUT_KEY, OUTPUT_KEY};
pub use evaluation::{
    run_on_dataset, EvaluationError, EvaluationInput, EvaluationResults, EvaluationSummary,
    Evaluator, ExampleResult, Feedback, FeedbackStats, FeedbackStore, RunEvalConfig,
};
pub use events::{RunEvent, RunStatus, RunType};
pub use exporter::{FlushError, FlushStats, LangSmithExporter};
pub use run_store::{RunContextStore, RunMetadata, RunUpdateDecision};
pub use sampler::{ProbabilitySampler, Sampler};
pub use sanitize::{sanitize_value, truncate_value, Sanitizer, DEFAULT_MAX_FIELD_BYTES};
pub use sink::TelemetrySink;
pub use tracer::LangSmithTracer;
