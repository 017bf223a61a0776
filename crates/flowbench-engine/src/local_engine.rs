// The local worker-pool backend.
//
// Each run executes its steps sequentially inside one unit of work on a
// bounded pool. The terminal state crosses the pool boundary as a wire
// record; the completion path deserializes it, forwards it to the
// run-update collaborator, and removes the task entry under the engine
// mutex. Cancellation aborts the run's task outright - partially written
// output files are leaked, not cleaned.

use crate::controller::ExecutionController;
use crate::worker::WorkerFactory;
use async_trait::async_trait;
use flowbench_common::{
    EngineSettings, ExecutedStep, Run, RunRecord, RunState, RunUpdateHandler,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tracks one in-flight asynchronous run.
struct LocalTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Executes runs in-process on a bounded worker pool.
pub struct LocalEngine {
    factory: Arc<WorkerFactory>,
    updater: Arc<dyn RunUpdateHandler>,
    pool: Arc<Semaphore>,
    settings: EngineSettings,
    /// In-flight asynchronous runs, keyed by run id. The only core state
    /// shared across tasks; the lock is never held across an await.
    tasks: Arc<Mutex<HashMap<Uuid, LocalTask>>>,
}

impl LocalEngine {
    pub fn new(
        factory: Arc<WorkerFactory>,
        updater: Arc<dyn RunUpdateHandler>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            factory,
            updater,
            pool: Arc::new(Semaphore::new(settings.pool_size)),
            settings,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The number of currently tracked asynchronous runs.
    pub fn active_runs(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

/// Execute every step of a run in order, short-circuiting on the first
/// failure. Returns the terminal state.
async fn run_steps(
    factory: &WorkerFactory,
    work_dir: &Path,
    running: RunState,
    steps: &[ExecutedStep],
    output_files: Vec<String>,
    cancel: CancellationToken,
) -> RunState {
    for (index, step) in steps.iter().enumerate() {
        let worker = factory.resolve(&step.image);
        tracing::debug!(
            "Executing step {}/{} (image '{}') in {}",
            index + 1,
            steps.len(),
            step.image,
            work_dir.display()
        );

        let result = worker.run(step, work_dir, cancel.clone()).await;
        if !result.is_success() {
            tracing::info!(
                "Step {}/{} failed with exit code {}",
                index + 1,
                steps.len(),
                result.exit_code
            );
            return running.error(result.failure_messages());
        }
    }

    running.success(output_files)
}

#[async_trait]
impl ExecutionController for LocalEngine {
    async fn exec_workflow(
        &self,
        run: Run,
        steps: Vec<ExecutedStep>,
        output_files: Vec<String>,
        run_async: bool,
    ) -> RunState {
        assert!(
            run.state.is_pending(),
            "exec_workflow requires a Pending run, got {} for run {}",
            run.state,
            run.id
        );

        tracing::info!(
            "Starting run {} ('{}'), {} step(s), async={}",
            run.id,
            run.display_name,
            steps.len(),
            run_async
        );

        let running = run.state.start();

        if !run_async {
            assert!(
                !self.tasks.lock().unwrap().contains_key(&run.id),
                "run {} is already executing",
                run.id
            );
            // Same execution path, on the caller's task.
            return run_steps(
                &self.factory,
                &run.work_dir,
                running,
                &steps,
                output_files,
                CancellationToken::new(),
            )
            .await;
        }

        let cancel_token = CancellationToken::new();
        let token_for_task = cancel_token.clone();
        let factory = self.factory.clone();
        let updater = self.updater.clone();
        let tasks = self.tasks.clone();
        let pool = self.pool.clone();
        let run_id = run.id;
        let display_name = run.display_name.clone();
        let work_dir = run.work_dir.clone();
        let running_for_task = running.clone();

        // Registration is one critical section: the occupancy check, the
        // spawn, and the insert happen under the same lock. A duplicate
        // dispatch hits the occupied entry and panics instead of
        // overwriting, and the task's own cleanup cannot observe the map
        // before its entry exists.
        let mut registry = self.tasks.lock().unwrap();
        let slot = match registry.entry(run_id) {
            Entry::Occupied(_) => panic!("run {run_id} is already executing"),
            Entry::Vacant(slot) => slot,
        };

        let handle = tokio::spawn(async move {
            // The whole run is one unit of work on the bounded pool.
            let terminal = match pool.acquire_owned().await {
                Ok(_permit) => {
                    run_steps(
                        &factory,
                        &work_dir,
                        running_for_task,
                        &steps,
                        output_files,
                        token_for_task,
                    )
                    .await
                }
                Err(e) => running_for_task
                    .error(vec![format!("failed to dispatch run to worker pool: {e:#}")]),
            };

            // The state crosses the pool boundary as a wire record; the
            // completion path deserializes it before forwarding.
            let forwarded = RunRecord::from(&terminal)
                .to_json()
                .and_then(|json| RunRecord::from_json(&json))
                .and_then(RunState::try_from);

            match forwarded {
                Ok(state) => {
                    if let Err(e) = updater.update_run(run_id, state, Some(&work_dir)).await {
                        tracing::error!(
                            "Failed to forward terminal state for run {} ('{}'): {:#}",
                            run_id,
                            display_name,
                            e
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Run {} produced an unreadable boundary record: {}",
                        run_id,
                        e
                    );
                }
            }

            tasks.lock().unwrap().remove(&run_id);
        });

        slot.insert(LocalTask {
            cancel_token,
            handle,
        });

        running
    }

    async fn cancel_run(&self, run_id: Uuid) {
        let task = self.tasks.lock().unwrap().remove(&run_id);
        match task {
            Some(task) => {
                tracing::info!("Cancelling run {}", run_id);
                task.cancel_token.cancel();
                task.handle.abort();
            }
            None => {
                tracing::debug!("Cancel for unknown or finished run {} ignored", run_id);
            }
        }
    }

    fn configuration(&self) -> Vec<(String, String)> {
        vec![
            ("backend".to_string(), "local".to_string()),
            ("poolSize".to_string(), self.settings.pool_size.to_string()),
            (
                "workRoot".to_string(),
                self.settings.work_root.display().to_string(),
            ),
            (
                "containerBinary".to_string(),
                self.settings.container_binary.clone(),
            ),
        ]
    }
}
