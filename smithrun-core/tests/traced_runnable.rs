use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use smithrun_core::{
    dispatch_traced, from_fn, BatchOptions, CallbackHandler, CallbackManager, RunConfig,
    RunContext, RunType, Runnable, SmithrunError, TracedRunnable, Value,
};
use uuid::Uuid;

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<(String, Uuid, Value)>>,
}

impl RecordingHandler {
    fn events(&self) -> Vec<(String, Uuid, Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CallbackHandler for RecordingHandler {
    async fn on_start(&self, ctx: &RunContext, inputs: &Value) {
        self.events
            .lock()
            .unwrap()
            .push(("start".to_string(), ctx.run_id, inputs.clone()));
    }

    async fn on_end(&self, ctx: &RunContext, outputs: &Value, _duration_ms: u128) {
        self.events
            .lock()
            .unwrap()
            .push(("end".to_string(), ctx.run_id, outputs.clone()));
    }

    async fn on_error(&self, ctx: &RunContext, error: &Value, _duration_ms: u128) {
        self.events
            .lock()
            .unwrap()
            .push(("error".to_string(), ctx.run_id, error.clone()));
    }
}

struct Exclaim;

#[async_trait::async_trait]
impl Runnable<String, String> for Exclaim {
    async fn invoke(&self, input: String) -> Result<String, SmithrunError> {
        Ok(format!("{}!", input))
    }
}

#[tokio::test]
async fn traced_runnable_emits_start_and_end() {
    let handler = Arc::new(RecordingHandler::default());
    let manager = CallbackManager::new(vec![handler.clone()]);
    let root = RunContext::root(RunType::Chain, "root".to_string(), vec![], BTreeMap::new());

    let traced = TracedRunnable::new(Exclaim, manager, root, RunType::Llm, "node".to_string());
    let output = traced.invoke("hi".to_string()).await.unwrap();

    assert_eq!(output, "hi!");
    let kinds: Vec<String> = handler.events().into_iter().map(|(kind, _, _)| kind).collect();
    assert_eq!(kinds, vec!["start", "end"]);
}

#[tokio::test]
async fn traced_dispatch_reports_each_item_as_its_own_run() {
    let handler = Arc::new(RecordingHandler::default());
    let config = RunConfig::with_callbacks(CallbackManager::new(vec![handler.clone()]));
    let op = from_fn(|input: String| async move {
        if input == "bad" {
            Err(SmithrunError::Custom("no answer".to_string()))
        } else {
            Ok(input.len())
        }
    });

    let results = dispatch_traced(
        &op,
        vec!["good".to_string(), "bad".to_string()],
        &BatchOptions::default(),
        &config,
    )
    .await;

    assert_eq!(results[0].success(), Some(&4));
    assert!(results[1].is_failure());

    let events = handler.events();
    assert_eq!(events.len(), 4);
    let starts: Vec<_> = events.iter().filter(|(kind, _, _)| kind == "start").collect();
    assert_eq!(starts.len(), 2);
    assert_ne!(starts[0].1, starts[1].1);

    let error = events
        .iter()
        .find(|(kind, _, _)| kind == "error")
        .expect("error event");
    assert_eq!(error.2, Value::String("no answer".to_string()));

    let end = events
        .iter()
        .find(|(kind, _, _)| kind == "end")
        .expect("end event");
    assert_eq!(end.2, serde_json::json!({"value": 4}));
}

#[tokio::test]
async fn traced_dispatch_without_callbacks_behaves_like_dispatch() {
    let results = dispatch_traced(
        &Exclaim,
        vec!["a".to_string()],
        &BatchOptions::default(),
        &RunConfig::default(),
    )
    .await;
    assert_eq!(results[0].success().map(String::as_str), Some("a!"));
}
