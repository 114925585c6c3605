use async_trait::async_trait;

use crate::{LangSmithError, RunEvent};

/// Destination for run events drained by the exporter.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn submit(&self, event: &RunEvent) -> Result<(), LangSmithError>;
}
