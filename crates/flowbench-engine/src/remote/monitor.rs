// Polling loops for remotely executing runs.
//
// The background monitor owns no shared engine state. It polls on a fixed
// cadence, suppresses observations whose variant tag matches the last
// forwarded state, and forwards genuine changes to the run-update
// collaborator. A rejected update stops the remote job best-effort and ends
// the monitor; the failure is never re-raised.

use crate::remote::RemoteClient;
use anyhow::Context;
use flowbench_common::{RunState, RunUpdateHandler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Download every declared output file of a `Success` state into the run's
/// working directory.
async fn download_outputs(
    client: &dyn RemoteClient,
    remote_id: &str,
    state: &RunState,
    work_dir: &Path,
) -> anyhow::Result<()> {
    if let RunState::Success { output_files, .. } = state {
        for file in output_files {
            client
                .download_file(remote_id, file, &work_dir.join(file))
                .await
                .with_context(|| format!("downloading '{file}' from remote job '{remote_id}'"))?;
        }
    }
    Ok(())
}

/// Poll a remote job until it reaches a terminal state and return that
/// state. Used for foreground execution; nothing is forwarded anywhere.
pub(crate) async fn poll_to_terminal(
    client: &dyn RemoteClient,
    remote_id: &str,
    running: RunState,
    work_dir: &Path,
    poll_interval: Duration,
) -> RunState {
    let mut last_known = running;
    loop {
        tokio::time::sleep(poll_interval).await;

        let observed = match client.poll_state(remote_id, &last_known).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Polling remote job '{}' failed: {:#}", remote_id, e);
                continue;
            }
        };

        if observed.is_terminal() {
            if observed.is_success() {
                if let Err(e) = download_outputs(client, remote_id, &observed, work_dir).await {
                    return last_known
                        .error(vec![format!("failed to download output files: {e:#}")]);
                }
            }
            return observed;
        }
        last_known = observed;
    }
}

/// Background monitor for one asynchronously executing remote run.
///
/// `initial` is the run's pre-submission state, so the remote `Running`
/// announcement is forwarded exactly once even though the service keeps
/// re-reporting it with fresh timestamps.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn monitor_run(
    client: Arc<dyn RemoteClient>,
    updater: Arc<dyn RunUpdateHandler>,
    run_id: Uuid,
    remote_id: String,
    work_dir: PathBuf,
    initial: RunState,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut last_known = initial;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Monitor for run {} cancelled", run_id);
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let observed = match client.poll_state(&remote_id, &last_known).await {
            Ok(state) => state,
            Err(e) => {
                // Transient by assumption; the cadence continues unchanged.
                tracing::warn!(
                    "Polling remote job '{}' for run {} failed: {:#}",
                    remote_id,
                    run_id,
                    e
                );
                continue;
            }
        };

        // Variant-tag equality: a re-announced state with fresh timestamps
        // is not a change.
        if observed == last_known {
            continue;
        }

        let forward = if observed.is_success() {
            match download_outputs(client.as_ref(), &remote_id, &observed, &work_dir).await {
                Ok(()) => observed,
                Err(e) => {
                    last_known.error(vec![format!("failed to download output files: {e:#}")])
                }
            }
        } else {
            observed
        };

        if let Err(e) = updater
            .update_run(run_id, forward.clone(), Some(&work_dir))
            .await
        {
            tracing::error!(
                "Run update for {} was rejected, abandoning monitor: {:#}",
                run_id,
                e
            );
            if forward.is_active() {
                // The run would keep executing with nobody watching it.
                if let Err(stop_err) = client.stop_remote_job(&remote_id).await {
                    tracing::warn!(
                        "Could not stop orphaned remote job '{}': {:#}",
                        remote_id,
                        stop_err
                    );
                }
            }
            return;
        }

        if forward.is_terminal() {
            tracing::info!("Run {} finished remotely as {}", run_id, forward);
            return;
        }
        last_known = forward;
    }
}
