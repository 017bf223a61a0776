// The contract every execution backend satisfies.

use async_trait::async_trait;
use flowbench_common::template::{self, ParameterDecl, TemplateError, WorkflowTemplate};
use flowbench_common::{ExecutedStep, Run, RunState};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A backend that starts, monitors, and cancels workflow runs.
///
/// Recoverable run failures never escape `exec_workflow` as errors - they
/// come back as an `Error` state with a non-empty message list. Misusing
/// the API (a non-`Pending` run, a run id already executing) is a
/// programming error and panics.
#[async_trait]
pub trait ExecutionController: Send + Sync {
    /// Execute a run.
    ///
    /// Preconditions: `run.state` is `Pending` and `run.id` is not already
    /// executing on this controller; violations panic.
    ///
    /// With `run_async` the run continues in the background and the
    /// `Running` state is returned immediately; terminal states reach the
    /// run-update collaborator from the background task. Without it, the
    /// call blocks until the run finishes and returns the terminal state.
    async fn exec_workflow(
        &self,
        run: Run,
        steps: Vec<ExecutedStep>,
        output_files: Vec<String>,
        run_async: bool,
    ) -> RunState;

    /// Stop a run's underlying execution resources and discard its task
    /// entry. A silent no-op for unknown or already-terminal runs. Does not
    /// persist the canceled state; the caller records it.
    async fn cancel_run(&self, run_id: Uuid);

    /// Introspect the backend's configuration. No side effects.
    fn configuration(&self) -> Vec<(String, String)>;

    /// Merge extra parameter declarations into a template's input section,
    /// replacing prior declarations with the same identifier. Fails when a
    /// resulting identifier collides across the file/non-file sections.
    fn augment_template(
        &self,
        template: WorkflowTemplate,
        extra_parameters: BTreeMap<String, ParameterDecl>,
    ) -> Result<WorkflowTemplate, TemplateError> {
        template::augment(template, extra_parameters)
    }
}
