use std::borrow::Cow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smithrun_core::Outcome;
use uuid::Uuid;

use crate::LangSmithError;

pub const INPUT_KEY: &str = "input";
pub const OUTPUT_KEY: &str = "output";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Option<Value>,
}

impl Example {
    /// The `"input"` field, or the whole inputs object rendered as JSON.
    pub fn input_text(&self) -> Cow<'_, str> {
        match self.inputs.get(INPUT_KEY).and_then(Value::as_str) {
            Some(text) => Cow::Borrowed(text),
            None => Cow::Owned(self.inputs.to_string()),
        }
    }

    pub fn reference_output(&self) -> Option<&str> {
        self.outputs
            .as_ref()
            .and_then(|outputs| outputs.get(OUTPUT_KEY))
            .and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewExample {
    pub inputs: Value,
    pub outputs: Option<Value>,
}

impl NewExample {
    pub fn from_pair(input: &str, output: &str) -> Self {
        Self {
            inputs: json!({ INPUT_KEY: input }),
            outputs: Some(json!({ OUTPUT_KEY: output })),
        }
    }
}

/// Hosted store of named example collections.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn create_dataset(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Dataset, LangSmithError>;

    async fn create_examples(
        &self,
        dataset_id: Uuid,
        examples: &[NewExample],
    ) -> Result<Vec<Example>, LangSmithError>;

    async fn list_examples(&self, dataset_id: Uuid) -> Result<Vec<Example>, LangSmithError>;
}

/// Pairs each successful outcome with its input. Failed items are skipped.
pub fn examples_from_outcomes<S>(inputs: &[S], outcomes: &[Outcome<String>]) -> Vec<NewExample>
where
    S: AsRef<str>,
{
    inputs
        .iter()
        .zip(outcomes)
        .filter_map(|(input, outcome)| {
            outcome
                .success()
                .map(|output| NewExample::from_pair(input.as_ref(), output))
        })
        .collect()
}
