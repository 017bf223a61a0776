// The run-update collaborator.
// Owned by the persistence/service layer, not by this core. Both backends
// invoke it on every state change they observe for a background run.

use crate::run_state::RunState;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Receives run state changes from the engines.
///
/// Implementations persist the new state. An `Err` from `update_run` is the
/// failure-containment signal for the remote monitor: the monitor stops the
/// remote job best-effort and exits instead of re-raising.
#[async_trait]
pub trait RunUpdateHandler: Send + Sync {
    async fn update_run(
        &self,
        run_id: Uuid,
        state: RunState,
        work_dir: Option<&Path>,
    ) -> Result<()>;
}

/// A test double that records every update it receives.
#[derive(Debug, Default)]
pub struct RecordingUpdateHandler {
    updates: parking_lot::Mutex<Vec<(Uuid, RunState, Option<PathBuf>)>>,
    /// When set, `update_run` fails after this many successful calls.
    fail_after: Option<usize>,
}

impl RecordingUpdateHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handler whose `update_run` errors once `limit` updates have
    /// been accepted.
    pub fn failing_after(limit: usize) -> Self {
        Self {
            updates: parking_lot::Mutex::new(Vec::new()),
            fail_after: Some(limit),
        }
    }

    pub fn updates(&self) -> Vec<(Uuid, RunState, Option<PathBuf>)> {
        self.updates.lock().clone()
    }

    pub fn states_for(&self, run_id: Uuid) -> Vec<RunState> {
        self.updates
            .lock()
            .iter()
            .filter(|(id, _, _)| *id == run_id)
            .map(|(_, state, _)| state.clone())
            .collect()
    }
}

#[async_trait]
impl RunUpdateHandler for RecordingUpdateHandler {
    async fn update_run(
        &self,
        run_id: Uuid,
        state: RunState,
        work_dir: Option<&Path>,
    ) -> Result<()> {
        let mut updates = self.updates.lock();
        if let Some(limit) = self.fail_after {
            if updates.len() >= limit {
                anyhow::bail!("update handler rejected state for run {run_id}");
            }
        }
        updates.push((run_id, state, work_dir.map(|p| p.to_path_buf())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_updates_in_order() {
        let handler = RecordingUpdateHandler::new();
        let id = Uuid::new_v4();
        let running = RunState::pending().start();
        handler.update_run(id, running.clone(), None).await.unwrap();
        handler
            .update_run(id, running.success(vec![]), None)
            .await
            .unwrap();

        let states = handler.states_for(id);
        assert_eq!(states.len(), 2);
        assert!(states[0].is_running());
        assert!(states[1].is_success());
    }

    #[tokio::test]
    async fn failing_after_limit() {
        let handler = RecordingUpdateHandler::failing_after(1);
        let id = Uuid::new_v4();
        let running = RunState::pending().start();
        assert!(handler.update_run(id, running.clone(), None).await.is_ok());
        assert!(handler.update_run(id, running, None).await.is_err());
    }
}
