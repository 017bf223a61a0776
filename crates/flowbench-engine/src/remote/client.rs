// The remote job service contract.

use anyhow::Result;
use async_trait::async_trait;
use flowbench_common::{ExecutedStep, Run, RunState};
use std::path::Path;

/// A client for the external service that executes runs remotely.
///
/// All methods are fallible at the transport level; interpretation of the
/// failures (retry, convert to an `Error` state, swallow) is the engine's
/// concern, not the client's.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Submit a run for remote execution. Returns the service-side job
    /// identifier used by every subsequent call.
    async fn create_remote_job(
        &self,
        run: &Run,
        steps: &[ExecutedStep],
        output_files: &[String],
    ) -> Result<String>;

    /// Fetch the current remote state of a job. `last_known` is the state
    /// the caller most recently observed; implementations may use it to
    /// request incremental views but are free to ignore it.
    async fn poll_state(&self, remote_id: &str, last_known: &RunState) -> Result<RunState>;

    /// Ask the service to stop a job. Stopping an already finished job is
    /// not an error.
    async fn stop_remote_job(&self, remote_id: &str) -> Result<()>;

    /// Download one of a finished job's files to `destination`, creating
    /// parent directories as needed.
    async fn download_file(
        &self,
        remote_id: &str,
        remote_path: &str,
        destination: &Path,
    ) -> Result<()>;
}
