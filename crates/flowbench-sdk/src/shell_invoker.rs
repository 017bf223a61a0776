use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The duration to wait after sending SIGINT before escalating to SIGTERM.
const SIGINT_TIMEOUT: Duration = Duration::from_millis(7500);
/// The duration to wait after sending SIGTERM before escalating to SIGKILL.
const SIGTERM_TIMEOUT: Duration = Duration::from_millis(2500);

/// The collected result of one shell invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    /// Returns `true` when the command exited with code zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single shell command in a working directory, reading stdout and
/// stderr line-by-line on their own tasks, and supports graceful
/// cancellation (SIGINT → SIGTERM → SIGKILL). Unlike a streaming process
/// host, the invoker drains its own readers and hands the collected lines
/// back in the result, which is the shape step workers need.
pub struct ShellInvoker {
    trace: Arc<dyn TraceWriter>,
    shell: String,
}

impl ShellInvoker {
    /// Create a new `ShellInvoker` using `/bin/sh`.
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self {
            trace,
            shell: "/bin/sh".to_string(),
        }
    }

    /// Create a new `ShellInvoker` with a custom shell binary.
    pub fn with_shell(trace: Arc<dyn TraceWriter>, shell: impl Into<String>) -> Self {
        Self {
            trace,
            shell: shell.into(),
        }
    }

    /// Execute `command` as `<shell> -c <command>` in `working_directory`.
    ///
    /// Returns the exit code and the captured stdout/stderr lines. A command
    /// that cannot even be spawned is an `Err`; a command that runs and exits
    /// non-zero is an `Ok` with the non-zero `exit_code`.
    pub async fn run(
        &self,
        working_directory: &Path,
        command: &str,
        environment: Option<&HashMap<String, String>>,
        cancellation_token: CancellationToken,
    ) -> Result<CommandOutput> {
        assert!(!command.is_empty(), "command must not be empty");

        self.trace.verbose(&format!(
            "Starting shell command '{}' in '{}'",
            command,
            working_directory.display()
        ));

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);

        if working_directory.is_dir() {
            cmd.current_dir(working_directory);
        }

        if let Some(env) = environment {
            for (key, value) in env {
                cmd.env(key, value);
            }
        }

        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        let start = std::time::Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start shell command '{command}'"))?;

        let pid = child.id().unwrap_or(0);
        self.trace
            .verbose(&format!("Process started with process id {pid}."));

        let stdout_task = Self::spawn_line_reader(child.stdout.take());
        let stderr_task = Self::spawn_line_reader(child.stderr.take());

        let exit_code: i32;
        let was_cancelled;

        tokio::select! {
            status = child.wait() => {
                was_cancelled = false;
                let status = status.context("Failed to wait for shell command")?;
                exit_code = status.code().unwrap_or(-1);
            }
            _ = cancellation_token.cancelled() => {
                was_cancelled = true;
                self.trace.info("Cancellation requested.");
                exit_code = self.cancel_and_kill_process(&mut child).await;
            }
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let elapsed = start.elapsed();
        self.trace.verbose(&format!(
            "Finished process {pid} with exit code {exit_code}, and elapsed time {elapsed:.2?}."
        ));

        if was_cancelled {
            anyhow::bail!("Shell command '{command}' was cancelled");
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Spawn a task that drains a child stream into a line vector.
    fn spawn_line_reader<R>(stream: Option<R>) -> JoinHandle<Vec<String>>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut collected = Vec::new();
            if let Some(stream) = stream {
                let reader = BufReader::new(stream);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    collected.push(line);
                }
            }
            collected
        })
    }

    /// Attempt graceful cancellation: SIGINT → SIGTERM → SIGKILL.
    async fn cancel_and_kill_process(&self, child: &mut tokio::process::Child) -> i32 {
        if self
            .send_signal_and_wait(child, Signal::Int, SIGINT_TIMEOUT)
            .await
        {
            self.trace
                .info("Process cancelled successfully through SIGINT.");
            return child
                .wait()
                .await
                .map(|s| s.code().unwrap_or(-1))
                .unwrap_or(-1);
        }

        if self
            .send_signal_and_wait(child, Signal::Term, SIGTERM_TIMEOUT)
            .await
        {
            self.trace
                .info("Process terminated successfully through SIGTERM.");
            return child
                .wait()
                .await
                .map(|s| s.code().unwrap_or(-1))
                .unwrap_or(-1);
        }

        self.trace
            .info("Killing process since both cancel and terminate signals have been ignored.");
        let _ = child.kill().await;
        child
            .wait()
            .await
            .map(|s| s.code().unwrap_or(-1))
            .unwrap_or(-1)
    }

    /// Send a signal to the child process and wait up to `timeout` for it to
    /// exit. Returns `true` if the process exited within the timeout.
    #[cfg(unix)]
    async fn send_signal_and_wait(
        &self,
        child: &mut tokio::process::Child,
        signal: Signal,
        timeout: Duration,
    ) -> bool {
        let pid = match child.id() {
            Some(id) => id,
            None => {
                // Process already exited
                return true;
            }
        };

        let sig = match signal {
            Signal::Int => nix::sys::signal::Signal::SIGINT,
            Signal::Term => nix::sys::signal::Signal::SIGTERM,
        };

        self.trace
            .verbose(&format!("Sending {sig:?} to process {pid}."));

        let send_result = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), sig);
        if send_result.is_err() {
            self.trace
                .verbose(&format!("{sig:?} signal failed to send to process {pid}."));
            return false;
        }

        tokio::select! {
            result = child.wait() => {
                result.is_ok()
            }
            _ = tokio::time::sleep(timeout) => {
                self.trace.verbose(&format!(
                    "Process did not honor {sig:?} within {:.1}s.",
                    timeout.as_secs_f64()
                ));
                false
            }
        }
    }

    #[cfg(not(unix))]
    async fn send_signal_and_wait(
        &self,
        child: &mut tokio::process::Child,
        _signal: Signal,
        timeout: Duration,
    ) -> bool {
        // No POSIX signals available; wait out the timeout then force kill.
        tokio::select! {
            result = child.wait() => {
                result.is_ok()
            }
            _ = tokio::time::sleep(timeout) => {
                false
            }
        }
    }
}

/// Internal signal type for cross-platform abstraction.
#[derive(Debug, Clone, Copy)]
enum Signal {
    Int,
    Term,
}
