// The built-in subprocess worker: one shell invocation per command, in
// order, in the run's working directory.

use crate::worker::{ExecResult, StepWorker};
use async_trait::async_trait;
use flowbench_common::ExecutedStep;
use flowbench_sdk::{ShellInvoker, TracingTraceWriter};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Executes step commands directly on the host through the shell.
/// This is the shared default worker for images without a configured
/// mapping.
pub struct SubprocessWorker {
    invoker: ShellInvoker,
}

impl SubprocessWorker {
    pub fn new() -> Self {
        Self {
            invoker: ShellInvoker::new(Arc::new(TracingTraceWriter)),
        }
    }
}

impl Default for SubprocessWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepWorker for SubprocessWorker {
    async fn run(
        &self,
        step: &ExecutedStep,
        work_dir: &Path,
        cancel: CancellationToken,
    ) -> ExecResult {
        let mut result = ExecResult::default();

        for command in &step.commands {
            match self
                .invoker
                .run(work_dir, command, None, cancel.clone())
                .await
            {
                Ok(output) => {
                    let success = output.is_success();
                    result.stdout.extend(output.stdout);
                    result.stderr.extend(output.stderr);
                    if !success {
                        result.exit_code = output.exit_code;
                        return result;
                    }
                }
                Err(e) => {
                    // The invocation never started (or was cancelled).
                    result.exit_code = 1;
                    result.error = Some(format!("{e:#}"));
                    return result;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(commands: &[&str]) -> ExecutedStep {
        ExecutedStep::new(
            "ubuntu:24.04",
            commands.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn runs_commands_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SubprocessWorker::new();
        let result = worker
            .run(
                &step(&["echo one > a.txt", "cat a.txt", "echo two"]),
                dir.path(),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_success());
        assert_eq!(result.stdout, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn stops_at_first_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SubprocessWorker::new();
        let result = worker
            .run(
                &step(&["echo ok", "echo failing >&2; exit 5", "touch never.txt"]),
                dir.path(),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(result.exit_code, 5);
        assert!(!result.is_success());
        assert_eq!(result.stderr, vec!["failing".to_string()]);
        assert!(!dir.path().join("never.txt").exists());
    }

    #[tokio::test]
    async fn unstartable_command_reports_exit_code_one() {
        let dir = tempfile::tempdir().unwrap();
        let worker = SubprocessWorker {
            invoker: ShellInvoker::with_shell(
                Arc::new(flowbench_sdk::NullTraceWriter),
                "/nonexistent/shell-xyz",
            ),
        };
        let result = worker
            .run(&step(&["echo hello"]), dir.path(), CancellationToken::new())
            .await;
        assert_eq!(result.exit_code, 1);
        assert!(result.error.is_some());
        assert!(!result.failure_messages().is_empty());
    }
}
