use dashmap::DashMap;
use uuid::Uuid;

use crate::events::RunStatus;

#[derive(Clone, Debug)]
pub struct RunMetadata {
    pub status: RunStatus,
    pub error: Option<String>,
    pub parent_id: Option<Uuid>,
}

impl RunMetadata {
    fn running(parent_id: Option<Uuid>) -> Self {
        Self {
            status: RunStatus::Running,
            error: None,
            parent_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunUpdateDecision {
    pub status: RunStatus,
    pub error: Option<String>,
}

/// Tracks run status so that the first terminal update of a run wins.
///
/// Entries live from a run's start until its terminal update has been
/// exported; the exporter calls [`RunContextStore::forget`] after that.
#[derive(Default)]
pub struct RunContextStore {
    runs: DashMap<Uuid, RunMetadata>,
}

impl RunContextStore {
    pub fn record_start(&self, run_id: Uuid, parent_id: Option<Uuid>) {
        self.runs.insert(run_id, RunMetadata::running(parent_id));
    }

    pub fn apply_update(&self, run_id: Uuid, error: Option<String>) -> RunUpdateDecision {
        let mut entry = self
            .runs
            .entry(run_id)
            .or_insert_with(|| RunMetadata::running(None));

        if entry.status == RunStatus::Running {
            entry.status = if error.is_some() {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            };
            entry.error = error;
        }

        RunUpdateDecision {
            status: entry.status.clone(),
            error: entry.error.clone(),
        }
    }

    pub fn forget(&self, run_id: Uuid) {
        self.runs.remove(&run_id);
    }

    pub fn status(&self, run_id: Uuid) -> Option<RunStatus> {
        self.runs.get(&run_id).map(|entry| entry.status.clone())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
