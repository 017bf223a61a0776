// The remote execution backend.
//
// Runs are submitted to an external job service; a background monitor task
// per run polls the service and forwards state changes to the run-update
// collaborator. Cancelling stops the service-side job and discards the
// monitor.

use crate::controller::ExecutionController;
use crate::remote::monitor;
use crate::remote::RemoteClient;
use async_trait::async_trait;
use flowbench_common::{EngineSettings, ExecutedStep, Run, RunState, RunUpdateHandler};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tracks one in-flight remote run.
struct RemoteTask {
    remote_id: String,
    cancel_token: CancellationToken,
    monitor: JoinHandle<()>,
}

/// Executes runs through a remote job service, observed by polling.
pub struct RemoteEngine {
    client: Arc<dyn RemoteClient>,
    updater: Arc<dyn RunUpdateHandler>,
    settings: EngineSettings,
    /// In-flight remote runs, keyed by run id. The lock is never held
    /// across an await.
    tasks: Arc<Mutex<HashMap<Uuid, RemoteTask>>>,
}

impl RemoteEngine {
    pub fn new(
        client: Arc<dyn RemoteClient>,
        updater: Arc<dyn RunUpdateHandler>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            client,
            updater,
            settings,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The number of currently monitored remote runs.
    pub fn active_runs(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionController for RemoteEngine {
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
        // Checked again under the registration lock below; this early check
        // fails fast before a remote job is created for a duplicate.
        assert!(
            !self.tasks.lock().unwrap().contains_key(&run.id),
            "run {} is already executing",
            run.id
        );

        tracing::info!(
            "Submitting run {} ('{}') to the remote service, {} step(s), async={}",
            run.id,
            run.display_name,
            steps.len(),
            run_async
        );

        let remote_id = match self
            .client
            .create_remote_job(&run, &steps, &output_files)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Could not create remote job for run {}: {:#}", run.id, e);
                return run
                    .state
                    .error(vec![format!("failed to create remote job: {e:#}")]);
            }
        };

        let running = run.state.start();

        if !run_async {
            return monitor::poll_to_terminal(
                self.client.as_ref(),
                &remote_id,
                running,
                &run.work_dir,
                self.settings.poll_interval(),
            )
            .await;
        }

        let cancel_token = CancellationToken::new();
        let token_for_task = cancel_token.clone();
        let client = self.client.clone();
        let updater = self.updater.clone();
        let tasks = self.tasks.clone();
        let run_id = run.id;
        let remote_id_for_task = remote_id.clone();
        let work_dir = run.work_dir.clone();
        // The monitor starts from the pre-submission state so the remote
        // Running announcement is forwarded as a change.
        let initial = run.state.clone();
        let poll_interval = self.settings.poll_interval();

        // Registration is one critical section: the occupancy check, the
        // spawn, and the insert happen under the same lock, so the monitor's
        // own cleanup cannot observe the map before its entry exists.
        let mut registry = self.tasks.lock().unwrap();
        let slot = match registry.entry(run_id) {
            Entry::Occupied(_) => panic!("run {run_id} is already executing"),
            Entry::Vacant(slot) => slot,
        };

        let handle = tokio::spawn(async move {
            monitor::monitor_run(
                client,
                updater,
                run_id,
                remote_id_for_task,
                work_dir,
                initial,
                poll_interval,
                token_for_task,
            )
            .await;
            tasks.lock().unwrap().remove(&run_id);
        });

        slot.insert(RemoteTask {
            remote_id,
            cancel_token,
            monitor: handle,
        });

        running
    }

    async fn cancel_run(&self, run_id: Uuid) {
        let task = self.tasks.lock().unwrap().remove(&run_id);
        match task {
            Some(task) => {
                tracing::info!(
                    "Cancelling run {} (remote job '{}')",
                    run_id,
                    task.remote_id
                );
                task.cancel_token.cancel();
                if let Err(e) = self.client.stop_remote_job(&task.remote_id).await {
                    tracing::warn!(
                        "Could not stop remote job '{}' for run {}: {:#}",
                        task.remote_id,
                        run_id,
                        e
                    );
                }
                task.monitor.abort();
            }
            None => {
                tracing::debug!("Cancel for unknown or finished run {} ignored", run_id);
            }
        }
    }

    fn configuration(&self) -> Vec<(String, String)> {
        vec![
            ("backend".to_string(), "remote".to_string()),
            (
                "pollIntervalSecs".to_string(),
                self.settings.poll_interval_secs.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use flowbench_common::RecordingUpdateHandler;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// A fake remote service that replays a scripted state sequence. The
    /// final scripted state repeats forever, mimicking a service that keeps
    /// re-announcing its current state on every poll.
    struct ScriptedClient {
        states: parking_lot::Mutex<Vec<RunState>>,
        stopped: parking_lot::Mutex<Vec<String>>,
        downloaded: parking_lot::Mutex<Vec<String>>,
        fail_create: bool,
        fail_download: bool,
    }

    impl ScriptedClient {
        fn with_states(states: Vec<RunState>) -> Self {
            Self {
                states: parking_lot::Mutex::new(states),
                stopped: parking_lot::Mutex::new(Vec::new()),
                downloaded: parking_lot::Mutex::new(Vec::new()),
                fail_create: false,
                fail_download: false,
            }
        }

        fn stopped_jobs(&self) -> Vec<String> {
            self.stopped.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteClient for ScriptedClient {
        async fn create_remote_job(
            &self,
            _run: &Run,
            _steps: &[ExecutedStep],
            _output_files: &[String],
        ) -> Result<String> {
            if self.fail_create {
                anyhow::bail!("remote service unavailable");
            }
            Ok("job-1".to_string())
        }

        async fn poll_state(&self, _remote_id: &str, _last_known: &RunState) -> Result<RunState> {
            let mut states = self.states.lock();
            if states.len() > 1 {
                Ok(states.remove(0))
            } else if let Some(state) = states.first() {
                Ok(state.clone())
            } else {
                anyhow::bail!("no scripted state left")
            }
        }

        async fn stop_remote_job(&self, remote_id: &str) -> Result<()> {
            self.stopped.lock().push(remote_id.to_string());
            Ok(())
        }

        async fn download_file(
            &self,
            _remote_id: &str,
            remote_path: &str,
            _destination: &Path,
        ) -> Result<()> {
            if self.fail_download {
                anyhow::bail!("file service returned 503");
            }
            self.downloaded.lock().push(remote_path.to_string());
            Ok(())
        }
    }

    fn remote_states(terminal: fn(&RunState) -> RunState) -> Vec<RunState> {
        let running = RunState::pending().start();
        vec![running.clone(), running.clone(), terminal(&running)]
    }

    fn engine_with(
        client: Arc<ScriptedClient>,
        updater: Arc<RecordingUpdateHandler>,
    ) -> RemoteEngine {
        RemoteEngine::new(client, updater, EngineSettings::default())
    }

    fn pending_run() -> Run {
        Run::new("remote run", "group-a", PathBuf::from("/tmp/remote-run"))
    }

    async fn wait_until_idle(engine: &RemoteEngine) {
        for _ in 0..500 {
            if engine.active_runs() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("engine never became idle");
    }

    #[tokio::test(start_paused = true)]
    async fn async_run_forwards_running_once_then_the_terminal_state() {
        let client = Arc::new(ScriptedClient::with_states(remote_states(|r| {
            r.success(vec!["out.csv".to_string()])
        })));
        let updater = Arc::new(RecordingUpdateHandler::new());
        let engine = engine_with(client.clone(), updater.clone());

        let run = pending_run();
        let run_id = run.id;
        let state = engine.exec_workflow(run, vec![], vec![], true).await;
        assert!(state.is_running());

        wait_until_idle(&engine).await;

        // Repeated Running announcements collapse into one forward.
        let states = updater.states_for(run_id);
        assert_eq!(states.len(), 2);
        assert!(states[0].is_running());
        assert!(states[1].is_success());
        assert_eq!(client.downloaded.lock().as_slice(), ["out.csv"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_run_blocks_to_terminal_without_updates() {
        let client = Arc::new(ScriptedClient::with_states(remote_states(|r| {
            r.error(vec!["remote step failed".to_string()])
        })));
        let updater = Arc::new(RecordingUpdateHandler::new());
        let engine = engine_with(client, updater.clone());

        let state = engine.exec_workflow(pending_run(), vec![], vec![], false).await;
        assert!(state.is_error());
        assert!(updater.updates().is_empty());
        assert_eq!(engine.active_runs(), 0);
    }

    #[tokio::test]
    async fn creation_failure_becomes_an_error_state() {
        let mut client = ScriptedClient::with_states(vec![]);
        client.fail_create = true;
        let updater = Arc::new(RecordingUpdateHandler::new());
        let engine = engine_with(Arc::new(client), updater.clone());

        let state = engine.exec_workflow(pending_run(), vec![], vec![], true).await;
        match state {
            RunState::Error { messages, .. } => {
                assert!(messages[0].contains("remote service unavailable"));
            }
            other => panic!("expected Error, got {other}"),
        }
        assert_eq!(engine.active_runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn download_failure_converts_success_into_error() {
        let mut client = ScriptedClient::with_states(remote_states(|r| {
            r.success(vec!["results.json".to_string()])
        }));
        client.fail_download = true;
        let updater = Arc::new(RecordingUpdateHandler::new());
        let engine = engine_with(Arc::new(client), updater.clone());

        let run = pending_run();
        let run_id = run.id;
        engine.exec_workflow(run, vec![], vec![], true).await;
        wait_until_idle(&engine).await;

        let states = updater.states_for(run_id);
        assert!(states[0].is_running());
        match &states[1] {
            RunState::Error { messages, .. } => {
                assert!(messages[0].contains("download"));
            }
            other => panic!("expected Error, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_update_stops_the_remote_job_and_ends_the_monitor() {
        let client = Arc::new(ScriptedClient::with_states(remote_states(|r| {
            r.success(vec![])
        })));
        // Every update is rejected, including the first Running forward.
        let updater = Arc::new(RecordingUpdateHandler::failing_after(0));
        let engine = engine_with(client.clone(), updater.clone());

        engine.exec_workflow(pending_run(), vec![], vec![], true).await;
        wait_until_idle(&engine).await;

        // The run was still active when its watcher gave up.
        assert_eq!(client.stopped_jobs(), ["job-1"]);
        assert!(updater.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_remote_job_and_is_idempotent() {
        let running = RunState::pending().start();
        let client = Arc::new(ScriptedClient::with_states(vec![running]));
        let updater = Arc::new(RecordingUpdateHandler::new());
        let engine = engine_with(client.clone(), updater.clone());

        engine.cancel_run(Uuid::new_v4()).await;
        assert!(client.stopped_jobs().is_empty());

        let run = pending_run();
        let run_id = run.id;
        engine.exec_workflow(run, vec![], vec![], true).await;
        assert_eq!(engine.active_runs(), 1);

        engine.cancel_run(run_id).await;
        assert_eq!(engine.active_runs(), 0);
        assert_eq!(client.stopped_jobs(), ["job-1"]);

        engine.cancel_run(run_id).await;
        assert_eq!(client.stopped_jobs(), ["job-1"]);
        assert!(updater.updates().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "already executing")]
    async fn double_dispatch_of_same_run_id_panics() {
        let running = RunState::pending().start();
        let client = Arc::new(ScriptedClient::with_states(vec![running]));
        let engine = engine_with(client, Arc::new(RecordingUpdateHandler::new()));

        let run = pending_run();
        let mut duplicate = pending_run();
        duplicate.id = run.id;

        engine.exec_workflow(run, vec![], vec![], true).await;
        let _ = engine.exec_workflow(duplicate, vec![], vec![], true).await;
    }
}
