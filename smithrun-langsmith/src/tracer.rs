use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use smithrun_core::callbacks::{CallbackHandler, RunContext, RunType as CoreRunType};
use uuid::Uuid;

use crate::{
    FlushError, FlushStats, LangSmithConfig, LangSmithExporter, ProbabilitySampler,
    RunContextStore, RunEvent, RunType, Sampler, Sanitizer, TelemetrySink,
    DEFAULT_MAX_FIELD_BYTES,
};

/// Callback handler that turns run lifecycle callbacks into LangSmith runs.
///
/// With `tracing_enabled = false` every callback is a no-op, so the same
/// wiring works whether or not tracing is switched on.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use smithrun_core::{CallbackManager, RunConfig};
/// use smithrun_langsmith::{LangSmithConfig, LangSmithTracer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tracer = Arc::new(LangSmithTracer::new(LangSmithConfig::from_env()?));
/// let run_config = RunConfig::with_callbacks(CallbackManager::new(vec![tracer.clone()]));
/// // ... dispatch work with `run_config` ...
/// tracer.flush(Duration::from_secs(10)).await?;
/// # Ok(())
/// # }
/// ```
pub struct LangSmithTracer {
    exporter: LangSmithExporter,
    sampler: Arc<dyn Sampler>,
    trace_sampling: DashMap<Uuid, bool>,
    sanitizer: Sanitizer,
    session_name: String,
    enabled: bool,
}

impl LangSmithTracer {
    pub fn new(config: LangSmithConfig) -> Self {
        let sampler = Arc::new(ProbabilitySampler {
            rate: config.sampling_rate,
        });
        Self::with_sampler(config, sampler)
    }

    pub fn with_sampler(config: LangSmithConfig, sampler: Arc<dyn Sampler>) -> Self {
        let exporter = LangSmithExporter::new(config.clone(), Arc::new(RunContextStore::default()));
        Self::from_parts(config, exporter, sampler)
    }

    /// Sends events to `sink` instead of the LangSmith API.
    pub fn with_sink(config: LangSmithConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let sampler = Arc::new(ProbabilitySampler {
            rate: config.sampling_rate,
        });
        let exporter =
            LangSmithExporter::with_sink(config.clone(), sink, Arc::new(RunContextStore::default()));
        Self::from_parts(config, exporter, sampler)
    }

    fn from_parts(
        config: LangSmithConfig,
        exporter: LangSmithExporter,
        sampler: Arc<dyn Sampler>,
    ) -> Self {
        Self {
            exporter,
            sampler,
            trace_sampling: DashMap::new(),
            sanitizer: Sanitizer::new(config.redact_regex.clone(), DEFAULT_MAX_FIELD_BYTES),
            session_name: config.project_name,
            enabled: config.tracing_enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn project_name(&self) -> &str {
        &self.session_name
    }

    /// Waits until every run event recorded so far has been submitted.
    pub async fn flush(&self, timeout: Duration) -> Result<FlushStats, FlushError> {
        self.exporter.flush(timeout).await
    }

    pub async fn shutdown(&self, timeout: Duration) -> Result<FlushStats, FlushError> {
        self.exporter.shutdown(timeout).await
    }

    pub fn dropped_events(&self) -> u64 {
        self.exporter.dropped_events()
    }

    fn should_sample(&self, trace_id: Uuid) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(entry) = self.trace_sampling.get(&trace_id) {
            return *entry;
        }
        let decision = self.sampler.should_sample(trace_id);
        self.trace_sampling.insert(trace_id, decision);
        decision
    }

    fn maybe_clear_trace(&self, ctx: &RunContext) {
        if ctx.parent_run_id.is_none() {
            self.trace_sampling.remove(&ctx.trace_id);
        }
    }

    fn map_run_type(run_type: &CoreRunType) -> RunType {
        match run_type {
            CoreRunType::Chain => RunType::Chain,
            CoreRunType::Tool => RunType::Tool,
            CoreRunType::Llm => RunType::Llm,
            CoreRunType::Agent => RunType::Agent,
            CoreRunType::Retriever => RunType::Retriever,
        }
    }

    async fn finish(
        &self,
        ctx: &RunContext,
        outputs: Option<Value>,
        error: Option<String>,
        duration_ms: u128,
    ) {
        let event = RunEvent::Update {
            run_id: ctx.run_id,
            end_time: Some(Utc::now()),
            outputs,
            error,
            duration_ms: Some(duration_ms),
        };
        self.exporter.enqueue(event).await;
    }
}

#[async_trait::async_trait]
impl CallbackHandler for LangSmithTracer {
    async fn on_start(&self, ctx: &RunContext, inputs: &Value) {
        if !self.should_sample(ctx.trace_id) {
            return;
        }

        let inputs = self.sanitizer.object(inputs.clone());
        let metadata = serde_json::to_value(&ctx.metadata).unwrap_or(Value::Null);
        let event = RunEvent::Start {
            run_id: ctx.run_id,
            parent_run_id: ctx.parent_run_id,
            trace_id: ctx.trace_id,
            name: ctx.name.clone(),
            run_type: Self::map_run_type(&ctx.run_type),
            start_time: DateTime::<Utc>::from(ctx.start_time),
            inputs,
            tags: ctx.tags.clone(),
            metadata: self.sanitizer.object(metadata),
            session_name: self.session_name.clone(),
            reference_example_id: ctx.reference_example_id(),
        };
        self.exporter.enqueue(event).await;
    }

    async fn on_end(&self, ctx: &RunContext, outputs: &Value, duration_ms: u128) {
        if self.should_sample(ctx.trace_id) {
            let outputs = self.sanitizer.object(outputs.clone());
            self.finish(ctx, Some(outputs), None, duration_ms).await;
        }
        self.maybe_clear_trace(ctx);
    }

    async fn on_error(&self, ctx: &RunContext, error: &Value, duration_ms: u128) {
        if self.should_sample(ctx.trace_id) {
            let error = self.sanitizer.text(error.clone());
            self.finish(ctx, None, Some(error), duration_ms).await;
        }
        self.maybe_clear_trace(ctx);
    }
}
