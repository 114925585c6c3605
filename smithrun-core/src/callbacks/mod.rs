use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{SmithrunError, Value};

mod wrappers;

pub use wrappers::TracedRunnable;

/// Metadata key linking a run to the dataset example it replays.
pub const REFERENCE_EXAMPLE_KEY: &str = "reference_example_id";

const DEFAULT_RUN_NAME: &str = "Runnable";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunType {
    Chain,
    Llm,
    Tool,
    Agent,
    Retriever,
}

#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub trace_id: Uuid,
    pub run_type: RunType,
    pub name: String,
    pub start_time: SystemTime,
    pub start_instant: Instant,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl RunContext {
    pub fn root(
        run_type: RunType,
        name: String,
        tags: Vec<String>,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            parent_run_id: None,
            trace_id: run_id,
            run_type,
            name,
            start_time: SystemTime::now(),
            start_instant: Instant::now(),
            tags,
            metadata,
        }
    }

    pub fn child(&self, run_type: RunType, name: String) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            parent_run_id: Some(self.run_id),
            trace_id: self.trace_id,
            run_type,
            name,
            start_time: SystemTime::now(),
            start_instant: Instant::now(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Resets the clock; contexts built ahead of a bounded batch start timing
    /// only once their invocation is actually launched.
    pub fn restart_clock(&mut self) {
        self.start_time = SystemTime::now();
        self.start_instant = Instant::now();
    }

    pub fn reference_example_id(&self) -> Option<Uuid> {
        self.metadata
            .get(REFERENCE_EXAMPLE_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    pub fn with_reference_example(mut self, example_id: Uuid) -> Self {
        self.metadata.insert(
            REFERENCE_EXAMPLE_KEY.to_string(),
            Value::String(example_id.to_string()),
        );
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub callbacks: Option<CallbackManager>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, Value>,
    pub name_override: Option<String>,
    pub run_type: Option<RunType>,
}

impl RunConfig {
    pub fn with_callbacks(callbacks: CallbackManager) -> Self {
        Self {
            callbacks: Some(callbacks),
            ..Default::default()
        }
    }

    pub fn root_context(&self) -> RunContext {
        RunContext::root(
            self.run_type.clone().unwrap_or(RunType::Chain),
            self.name_override
                .clone()
                .unwrap_or_else(|| DEFAULT_RUN_NAME.to_string()),
            self.tags.clone(),
            self.metadata.clone(),
        )
    }

    pub fn callbacks(&self) -> CallbackManager {
        self.callbacks.clone().unwrap_or_default()
    }
}

#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn on_start(&self, ctx: &RunContext, inputs: &Value);
    async fn on_end(&self, ctx: &RunContext, outputs: &Value, duration_ms: u128);
    async fn on_error(&self, ctx: &RunContext, error: &Value, duration_ms: u128);
}

#[derive(Clone, Default)]
pub struct CallbackManager {
    handlers: Vec<Arc<dyn CallbackHandler>>,
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackManager")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl CallbackManager {
    pub fn new(handlers: Vec<Arc<dyn CallbackHandler>>) -> Self {
        Self { handlers }
    }

    pub fn noop() -> Self {
        Self { handlers: vec![] }
    }

    pub fn is_noop(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn add_handler(&mut self, handler: Arc<dyn CallbackHandler>) {
        self.handlers.push(handler);
    }

    /// True if this exact handler instance is already registered.
    pub fn contains(&self, handler: &Arc<dyn CallbackHandler>) -> bool {
        self.handlers
            .iter()
            .any(|registered| Arc::ptr_eq(registered, handler))
    }

    pub async fn on_start(&self, ctx: &RunContext, inputs: &Value) {
        for handler in &self.handlers {
            handler.on_start(ctx, inputs).await;
        }
    }

    pub async fn on_end(&self, ctx: &RunContext, outputs: &Value, duration_ms: u128) {
        for handler in &self.handlers {
            handler.on_end(ctx, outputs, duration_ms).await;
        }
    }

    pub async fn on_error(&self, ctx: &RunContext, error: &Value, duration_ms: u128) {
        for handler in &self.handlers {
            handler.on_error(ctx, error, duration_ms).await;
        }
    }

    /// Reports the terminal state of `ctx`, timed from its start instant.
    pub async fn on_finish<O>(&self, ctx: &RunContext, result: Result<&O, &SmithrunError>)
    where
        O: ToTraceOutput + ?Sized,
    {
        let duration_ms = ctx.start_instant.elapsed().as_millis();
        match result {
            Ok(output) => {
                let outputs = ensure_object(output.to_trace_output());
                self.on_end(ctx, &outputs, duration_ms).await;
            }
            Err(err) => {
                let error = Value::String(err.to_string());
                self.on_error(ctx, &error, duration_ms).await;
            }
        }
    }
}

pub trait ToTraceInput {
    fn to_trace_input(&self) -> Value;
}

pub trait ToTraceOutput {
    fn to_trace_output(&self) -> Value;
}

impl<T> ToTraceInput for T
where
    T: Serialize + ?Sized,
{
    fn to_trace_input(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl<T> ToTraceOutput for T
where
    T: Serialize + ?Sized,
{
    fn to_trace_output(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn ensure_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => Value::Object(serde_json::Map::from_iter([("value".to_string(), other)])),
    }
}
