// Per-step worker abstraction: executes one step's command list in a chosen
// runtime and returns a uniform result.

pub mod container;
pub mod factory;
pub mod subprocess;

pub use container::ContainerWorker;
pub use factory::{WorkerFactory, WorkerKind, WorkerSpec};
pub use subprocess::SubprocessWorker;

use async_trait::async_trait;
use flowbench_common::ExecutedStep;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// The uniform result of executing one step.
///
/// A step that could not even start is reported as `exit_code` 1 with the
/// failure captured in `error`; nothing a worker does surfaces as a Rust
/// error to the engine.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub error: Option<String>,
}

impl ExecResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// The user-visible messages for a failed step. Never empty: captured
    /// stderr first, then the start failure, then a generic exit-code line.
    pub fn failure_messages(&self) -> Vec<String> {
        let mut messages = self.stderr.clone();
        if let Some(ref error) = self.error {
            messages.push(error.clone());
        }
        if messages.is_empty() {
            messages.push(format!("step exited with code {}", self.exit_code));
        }
        messages
    }
}

/// Executes one step's command list in a specific runtime.
#[async_trait]
pub trait StepWorker: Send + Sync {
    /// Run every command of `step` in order inside `work_dir`, stopping at
    /// the first failure.
    async fn run(
        &self,
        step: &ExecutedStep,
        work_dir: &Path,
        cancel: CancellationToken,
    ) -> ExecResult;
}
