// Triggers the post-processing workflow over a result ranking.
//
// A new synthetic run is started only when the set of ranked run ids
// actually changed; ordering changes within the same set do not re-trigger.
// Input files from every ranked run are staged into the synthetic run's
// working directory before execution, namespaced per source run so equal
// file names cannot collide.

use crate::controller::ExecutionController;
use anyhow::{Context, Result};
use flowbench_common::{ExecutedStep, RankingEntry, Run, RunState, RunUpdateHandler};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// What the post-processing workflow consumes and produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessingSpec {
    /// Files collected from each ranked run's working directory.
    #[serde(rename = "inputFiles")]
    pub input_files: Vec<String>,
    pub steps: Vec<ExecutedStep>,
    #[serde(rename = "outputFiles")]
    pub output_files: Vec<String>,
}

/// Resolves the working directory of a previously executed run.
/// Owned by the persistence layer; `None` means the run is unknown or its
/// directory is gone.
pub trait RunLocator: Send + Sync {
    fn run_directory(&self, run_id: Uuid) -> Option<PathBuf>;
}

/// Starts the post-processing workflow when a workflow's result ranking
/// changes.
pub struct PostProcessingTrigger {
    controller: Arc<dyn ExecutionController>,
    updater: Arc<dyn RunUpdateHandler>,
    locator: Arc<dyn RunLocator>,
    work_root: PathBuf,
}

impl PostProcessingTrigger {
    pub fn new(
        controller: Arc<dyn ExecutionController>,
        updater: Arc<dyn RunUpdateHandler>,
        locator: Arc<dyn RunLocator>,
        work_root: PathBuf,
    ) -> Self {
        Self {
            controller,
            updater,
            locator,
            work_root,
        }
    }

    /// Evaluate a fresh ranking against the previously processed run set.
    ///
    /// Returns `None` when the set is unchanged and nothing was started.
    /// Otherwise a synthetic run executes the post-processing steps and its
    /// resulting state is returned; a staging failure yields an `Error`
    /// state without invoking the execution backend. Either way the
    /// run-update collaborator observes the outcome.
    pub async fn trigger(
        &self,
        workflow_name: &str,
        spec: &PostProcessingSpec,
        ranking: &[RankingEntry],
        previous_run_ids: &[Uuid],
        run_async: bool,
    ) -> Option<RunState> {
        let mut current: Vec<Uuid> = ranking.iter().map(|entry| entry.run_id).collect();
        current.sort();
        let mut previous = previous_run_ids.to_vec();
        previous.sort();
        if current == previous {
            tracing::debug!(
                "Ranking of '{}' still covers the same {} run(s), not re-triggering",
                workflow_name,
                current.len()
            );
            return None;
        }

        let run_id = Uuid::new_v4();
        let mut run = Run::new(
            format!("{workflow_name} post-processing"),
            workflow_name,
            self.work_root.join("postprocessing").join(run_id.to_string()),
        );
        // The working directory is named after the run itself.
        run.id = run_id;
        tracing::info!(
            "Ranking of '{}' changed, starting post-processing run {} over {} run(s)",
            workflow_name,
            run.id,
            ranking.len()
        );

        if let Err(e) = self.stage_inputs(&run, spec, ranking).await {
            tracing::error!(
                "Staging inputs for post-processing run {} failed: {:#}",
                run.id,
                e
            );
            let error = run
                .state
                .error(vec![format!("failed to stage input files: {e:#}")]);
            if let Err(update_err) = self
                .updater
                .update_run(run.id, error.clone(), Some(&run.work_dir))
                .await
            {
                tracing::warn!(
                    "Could not record staging failure for run {}: {:#}",
                    run.id,
                    update_err
                );
            }
            return Some(error);
        }

        Some(
            self.controller
                .exec_workflow(
                    run,
                    spec.steps.clone(),
                    spec.output_files.clone(),
                    run_async,
                )
                .await,
        )
    }

    /// Copy every input file of every ranked run into the synthetic run's
    /// working directory, under a per-source-run subdirectory.
    async fn stage_inputs(
        &self,
        run: &Run,
        spec: &PostProcessingSpec,
        ranking: &[RankingEntry],
    ) -> Result<()> {
        tokio::fs::create_dir_all(&run.work_dir)
            .await
            .with_context(|| format!("creating {}", run.work_dir.display()))?;

        for entry in ranking {
            let source_dir = self
                .locator
                .run_directory(entry.run_id)
                .with_context(|| format!("no working directory known for run {}", entry.run_id))?;
            let staged_dir = run.work_dir.join(entry.run_id.to_string());

            for file in &spec.input_files {
                let source = source_dir.join(file);
                let destination = staged_dir.join(file);
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                tokio::fs::copy(&source, &destination).await.with_context(|| {
                    format!("copying {} for run {}", source.display(), entry.run_id)
                })?;
            }
        }
        Ok(())
    }
}
