// Run and step value types consumed and produced by the execution
// controllers. Steps arrive here fully expanded; template-parameter
// substitution happens upstream.

use crate::run_state::RunState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One execution instance of a workflow for a specific argument set.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: Uuid,
    /// Human-readable label, shown in logs only.
    pub display_name: String,
    /// The owning user group.
    pub group: String,
    /// Working directory of the run; step commands execute here and
    /// declared output files are resolved relative to it.
    pub work_dir: PathBuf,
    pub state: RunState,
}

impl Run {
    /// Create a new `Pending` run.
    pub fn new(display_name: impl Into<String>, group: impl Into<String>, work_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            group: group.into(),
            work_dir,
            state: RunState::pending(),
        }
    }
}

/// One unit of sequential execution within a run: a runtime image and the
/// ordered command list to execute in it. Fully expanded - no unresolved
/// parameter references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub image: String,
    pub commands: Vec<String>,
}

impl ExecutedStep {
    pub fn new(image: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            image: image.into(),
            commands,
        }
    }
}

/// One entry of a workflow's result ranking, consumed by the
/// post-processing trigger. Entries arrive in ranking order; the trigger
/// only requires stable run-identifier comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    #[serde(rename = "runId")]
    pub run_id: Uuid,
    #[serde(rename = "groupName")]
    pub group: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_is_pending() {
        let run = Run::new("bench run", "group-a", PathBuf::from("/tmp/run"));
        assert!(run.state.is_pending());
        assert_eq!(run.group, "group-a");
    }

    #[test]
    fn executed_step_serde() {
        let step = ExecutedStep::new("python:3.12", vec!["python analyze.py".to_string()]);
        let json = serde_json::to_string(&step).unwrap();
        let parsed: ExecutedStep = serde_json::from_str(&json).unwrap();
        assert_eq!(step, parsed);
    }

    #[test]
    fn ranking_entry_wire_names() {
        let entry = RankingEntry {
            run_id: Uuid::new_v4(),
            group: "group-b".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"runId\""));
        assert!(json.contains("\"groupName\""));
    }
}
