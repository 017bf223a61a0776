// The built-in container worker: one container per command, run through the
// container CLI with the run's working directory bind-mounted read-write.

use crate::worker::{ExecResult, StepWorker};
use async_trait::async_trait;
use flowbench_common::ExecutedStep;
use flowbench_sdk::{ShellInvoker, TraceLevel, TraceWriter};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Container CLI trace writer.
struct ContainerTraceWriter;

impl TraceWriter for ContainerTraceWriter {
    fn write(&self, level: TraceLevel, message: &str) {
        match level {
            TraceLevel::Verbose => tracing::debug!(target: "container", "{}", message),
            TraceLevel::Info => tracing::info!(target: "container", "{}", message),
            TraceLevel::Warning => tracing::warn!(target: "container", "{}", message),
            TraceLevel::Error => tracing::error!(target: "container", "{}", message),
        }
    }
}

/// Executes step commands inside containers of the step's declared image.
///
/// An image or runtime-level failure (pull error, missing image, daemon not
/// reachable) surfaces as the CLI's non-zero exit and is treated identically
/// to a failing command.
pub struct ContainerWorker {
    binary: String,
    invoker: ShellInvoker,
}

impl ContainerWorker {
    /// Create a worker driving the `docker` CLI.
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Create a worker driving a custom container CLI binary (e.g. podman).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            invoker: ShellInvoker::new(Arc::new(ContainerTraceWriter)),
        }
    }

    /// Build the CLI invocation for one command: the work dir is mounted
    /// read-write at its host path and used as the container working
    /// directory, so relative paths behave as they do for the subprocess
    /// worker.
    fn container_command(&self, image: &str, work_dir: &Path, command: &str) -> String {
        let dir = work_dir.display();
        format!(
            "{} run --rm -v {dir}:{dir} -w {dir} {image} /bin/sh -c {}",
            self.binary,
            shell_quote(command)
        )
    }
}

impl Default for ContainerWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepWorker for ContainerWorker {
    async fn run(
        &self,
        step: &ExecutedStep,
        work_dir: &Path,
        cancel: CancellationToken,
    ) -> ExecResult {
        let mut result = ExecResult::default();

        for command in &step.commands {
            let cli = self.container_command(&step.image, work_dir, command);
            match self.invoker.run(work_dir, &cli, None, cancel.clone()).await {
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
                    result.exit_code = 1;
                    result.error = Some(format!("{e:#}"));
                    return result;
                }
            }
        }

        result
    }
}

/// Quote a string for safe embedding in a POSIX shell command line.
fn shell_quote(input: &str) -> String {
    format!("'{}'", input.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn container_command_mounts_work_dir() {
        let worker = ContainerWorker::new();
        let cli = worker.container_command(
            "python:3.12",
            &PathBuf::from("/work/run-1"),
            "python analyze.py",
        );
        assert_eq!(
            cli,
            "docker run --rm -v /work/run-1:/work/run-1 -w /work/run-1 python:3.12 /bin/sh -c 'python analyze.py'"
        );
    }

    #[test]
    fn container_command_honors_custom_binary() {
        let worker = ContainerWorker::with_binary("podman");
        let cli = worker.container_command("alpine", &PathBuf::from("/w"), "ls");
        assert!(cli.starts_with("podman run --rm"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("echo 'hi'"), r"'echo '\''hi'\'''");
        assert_eq!(shell_quote("plain"), "'plain'");
    }
}
