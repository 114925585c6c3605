use std::collections::BTreeMap;

use smithrun_core::{ensure_object, CallbackManager, RunConfig, RunContext, RunType, Value};
use uuid::Uuid;

#[test]
fn child_context_inherits_trace_and_parent() {
    let root = RunContext::root(RunType::Agent, "agent".to_string(), vec![], BTreeMap::new());
    let child = root.child(RunType::Tool, "search".to_string());
    assert_eq!(child.parent_run_id, Some(root.run_id));
    assert_eq!(child.trace_id, root.trace_id);
}

#[test]
fn root_context_is_its_own_trace() {
    let root = RunContext::root(RunType::Chain, "root".to_string(), vec![], BTreeMap::new());
    assert_eq!(root.trace_id, root.run_id);
    assert!(root.parent_run_id.is_none());
}

#[test]
fn ensure_object_wraps_primitives() {
    let wrapped = ensure_object(Value::String("hello".to_string()));
    assert_eq!(wrapped, serde_json::json!({"value": "hello"}));
}

#[test]
fn callback_manager_noop_has_no_handlers() {
    assert!(CallbackManager::noop().is_noop());
    assert!(RunConfig::default().callbacks().is_noop());
}

#[test]
fn reference_example_round_trips_through_metadata() {
    let example_id = Uuid::new_v4();
    let ctx = RunConfig::default()
        .root_context()
        .with_reference_example(example_id);
    assert_eq!(ctx.reference_example_id(), Some(example_id));
    assert_eq!(ctx.name, "Runnable");
}

#[test]
fn run_config_carries_name_tags_and_type() {
    let config = RunConfig {
        name_override: Some("agent".to_string()),
        tags: vec!["walkthrough".to_string()],
        run_type: Some(RunType::Agent),
        ..Default::default()
    };
    let ctx = config.root_context();
    assert_eq!(ctx.name, "agent");
    assert_eq!(ctx.tags, vec!["walkthrough".to_string()]);
    assert_eq!(ctx.run_type, RunType::Agent);
    assert_ne!(config.root_context().run_id, ctx.run_id);
}

#[test]
fn callback_manager_recognises_registered_handler() {
    use std::sync::Arc;

    use smithrun_core::CallbackHandler;

    struct Silent;

    #[async_trait::async_trait]
    impl CallbackHandler for Silent {
        async fn on_start(&self, _ctx: &RunContext, _inputs: &Value) {}
        async fn on_end(&self, _ctx: &RunContext, _outputs: &Value, _duration_ms: u128) {}
        async fn on_error(&self, _ctx: &RunContext, _error: &Value, _duration_ms: u128) {}
    }

    let registered: Arc<dyn CallbackHandler> = Arc::new(Silent);
    let other: Arc<dyn CallbackHandler> = Arc::new(Silent);
    let manager = CallbackManager::new(vec![registered.clone()]);

    assert!(manager.contains(&registered));
    assert!(!manager.contains(&other));
}
