//! Application service — cascading formation teardown.
//!
//! Used by uninstall and by force-reinstall. Best-effort throughout:
//! "already absent" is success, an unreachable scheduler degrades to "jobs
//! may be orphaned", and a path escaping the state root is a hard
//! rejection surfaced as a warning.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::{
    FormationStateStore, HostConfigStore, ProgressReporter, SchedulerClient, WorkspaceFs,
};
use crate::domain::patcher;
use crate::domain::state::FormationState;

/// Result of a teardown.
#[derive(Debug, Clone, Default)]
pub struct TeardownOutcome {
    pub warnings: Vec<String>,
}

/// Remove everything a formation deployed: remote jobs, config entries,
/// workspaces, the state record, and optionally its source snapshot.
///
/// # Errors
///
/// Returns an error if the config document or state record cannot be
/// written; everything else is best-effort.
pub async fn teardown_formation<S: SchedulerClient>(
    config_store: &impl HostConfigStore,
    state_store: &impl FormationStateStore,
    scheduler: Option<&S>,
    fs: &impl WorkspaceFs,
    reporter: &impl ProgressReporter,
    state: &FormationState,
    home_root: &Path,
    agents_state_root: &Path,
    remove_snapshot: bool,
) -> Result<TeardownOutcome> {
    let mut outcome = TeardownOutcome::default();

    // Remote jobs first: after the state record is gone there is no way to
    // find them again.
    if state.cron_jobs.is_empty() {
        // nothing scheduled
    } else if let Some(client) = scheduler {
        for job in &state.cron_jobs {
            match client.remove_job(&job.id).await {
                Ok(()) => reporter.step(&format!("removed job '{}'", job.name)),
                Err(err) if err.is_not_found() => {}
                Err(err) => outcome
                    .warnings
                    .push(format!("job '{}': {err}", job.name)),
            }
        }
    } else {
        outcome.warnings.push(format!(
            "scheduler unreachable — {} job(s) may be orphaned",
            state.cron_jobs.len()
        ));
    }

    // Config document: removals only, then one topology recompute with an
    // empty edge set to withdraw the namespace's allow pattern.
    let mut config = config_store.load().await.context("re-reading host config")?;
    for binding in &state.bindings {
        patcher::remove_binding(&mut config, binding);
    }
    for record in state.agents.values() {
        patcher::remove_agent_entry(&mut config, &record.id);
    }
    patcher::recompute_agent_to_agent(&mut config, &state.namespace, &[]);
    config_store.save(&config).await.context("writing host config")?;
    reporter.step("host configuration cleaned");

    // Workspaces and per-agent auxiliary state, guarded.
    for record in state.agents.values() {
        let aux = agents_state_root.join(&record.id);
        for path in [record.workspace.clone(), aux] {
            if let Err(err) = fs.remove_dir_within(home_root, &path) {
                outcome
                    .warnings
                    .push(format!("skipped removing {}: {err}", path.display()));
            }
        }
    }

    if remove_snapshot && let Some(snapshot) = &state.source_path {
        if let Err(err) = fs.remove_dir_within(home_root, snapshot) {
            outcome
                .warnings
                .push(format!("skipped removing {}: {err}", snapshot.display()));
        }
    }

    state_store
        .remove(&state.namespace, &state.name)
        .await
        .context("removing formation state record")?;
    reporter.success(&format!(
        "formation '{}/{}' removed",
        state.namespace, state.name
    ));

    Ok(outcome)
}
