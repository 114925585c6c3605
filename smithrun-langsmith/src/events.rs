use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunType {
    Chain,
    Tool,
    Llm,
    Agent,
    Retriever,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Chain => "chain",
            RunType::Tool => "tool",
            RunType::Llm => "llm",
            RunType::Agent => "agent",
            RunType::Retriever => "retriever",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug)]
pub enum RunEvent {
    Start {
        run_id: Uuid,
        parent_run_id: Option<Uuid>,
        trace_id: Uuid,
        name: String,
        run_type: RunType,
        start_time: DateTime<Utc>,
        inputs: Value,
        tags: Vec<String>,
        metadata: Value,
        session_name: String,
        reference_example_id: Option<Uuid>,
    },
    Update {
        run_id: Uuid,
        end_time: Option<DateTime<Utc>>,
        outputs: Option<Value>,
        error: Option<String>,
        duration_ms: Option<u128>,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::Start { run_id, .. } | RunEvent::Update { run_id, .. } => *run_id,
        }
    }

    /// Body for `POST /runs` (start) or `PATCH /runs/{id}` (update).
    pub fn to_payload(&self) -> Value {
        match self {
            RunEvent::Start {
                run_id,
                parent_run_id,
                trace_id,
                name,
                run_type,
                start_time,
                inputs,
                tags,
                metadata,
                session_name,
                reference_example_id,
            } => {
                let mut payload = json!({
                    "id": run_id,
                    "trace_id": trace_id,
                    "name": name,
                    "run_type": run_type.as_str(),
                    "start_time": start_time.to_rfc3339(),
                    "inputs": inputs,
                    "tags": tags,
                    "extra": {"metadata": metadata},
                    "session_name": session_name,
                });
                if let Value::Object(map) = &mut payload {
                    if let Some(parent) = parent_run_id {
                        map.insert("parent_run_id".to_string(), json!(parent));
                    }
                    if let Some(example) = reference_example_id {
                        map.insert("reference_example_id".to_string(), json!(example));
                    }
                }
                payload
            }
            RunEvent::Update {
                end_time,
                outputs,
                error,
                duration_ms,
                ..
            } => {
                let mut payload = Map::new();
                if let Some(end_time) = end_time {
                    payload.insert("end_time".to_string(), Value::String(end_time.to_rfc3339()));
                }
                if let Some(outputs) = outputs {
                    payload.insert("outputs".to_string(), outputs.clone());
                }
                if let Some(error) = error {
                    payload.insert("error".to_string(), Value::String(error.clone()));
                }
                if let Some(duration_ms) = duration_ms {
                    let duration_ms = u64::try_from(*duration_ms).unwrap_or(u64::MAX);
                    payload.insert("extra".to_string(), json!({"duration_ms": duration_ms}));
                }
                Value::Object(payload)
            }
        }
    }
}
