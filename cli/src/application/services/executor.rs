//! Application service — migration executor.
//!
//! Applies a computed plan against the three backing stores in a fixed
//! order chosen to bound blast radius on partial failure: (1) workspace
//! filesystem, (2) host configuration document, (3) remote scheduler, then
//! (4) persists the updated formation state. State is written only after
//! the first three steps have been attempted, so a crash mid-execution
//! leaves the record still describing the previous durable state and a
//! repair or re-run of update is always safe.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aviary_common::{AgentEntry, Binding, FormationManifest};
use chrono::Utc;
use serde::Serialize;

use crate::application::ports::{
    CronJobParams, FormationStateStore, HostConfigStore, ProgressReporter, SchedulerClient,
    WorkspaceFs,
};
use crate::application::services::stage::StagedTree;
use crate::domain::patcher;
use crate::domain::plan::{
    desired_topology_edges, AgentChange, AgentChangeKind, BindingChange, CronJobChange,
    CronJobSpec, MigrationPlan, VersionChange,
};
use crate::domain::state::{file_hash_key, AgentRecord, CronJobRecord, FormationState};

/// Everything the executor needs to apply one plan.
pub struct ExecuteRequest<'a> {
    pub plan: &'a MigrationPlan,
    pub manifest: &'a FormationManifest,
    pub namespace: &'a str,
    pub name: &'a str,
    /// Slug -> resolved agent id.
    pub agent_ids: &'a BTreeMap<String, String>,
    pub staged: &'a StagedTree,
    /// Variable map safe to persist (sensitive values already redacted).
    pub persisted_variables: &'a BTreeMap<String, String>,
    pub previous: Option<&'a FormationState>,
    /// Containment root for every scoped deletion.
    pub home_root: &'a Path,
    pub workspaces_root: &'a Path,
    /// Per-agent auxiliary state directories (sessions, memory).
    pub agents_state_root: &'a Path,
    /// Persisted source snapshot to record in the new state.
    pub source_snapshot: Option<PathBuf>,
}

/// Human-facing change summary: counts by change type plus collected
/// warnings. Job counts reflect what the scheduler actually confirmed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub agents_added: usize,
    pub agents_updated: usize,
    pub agents_removed: usize,
    pub agents_unchanged: usize,
    pub bindings_added: usize,
    pub bindings_removed: usize,
    pub jobs_added: usize,
    pub jobs_updated: usize,
    pub jobs_removed: usize,
    pub topology_changes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionChange>,
    pub warnings: Vec<String>,
}

/// Apply `req.plan`. Filesystem and config errors are fatal (state is left
/// untouched, describing the previous durable state); scheduler errors are
/// collected per job and surfaced as warnings.
///
/// # Errors
///
/// Returns an error if workspace deployment, the config document write, or
/// the final state write fails.
pub async fn execute_plan<S: SchedulerClient>(
    config_store: &impl HostConfigStore,
    state_store: &impl FormationStateStore,
    scheduler: Option<&S>,
    fs: &impl WorkspaceFs,
    reporter: &impl ProgressReporter,
    req: &ExecuteRequest<'_>,
) -> Result<MigrationOutcome> {
    let mut outcome = MigrationOutcome {
        version: req.plan.version.clone(),
        ..MigrationOutcome::default()
    };

    apply_workspaces(fs, reporter, req, &mut outcome)?;
    apply_config(config_store, reporter, req, &mut outcome).await?;
    let cron_jobs = apply_scheduler(scheduler, reporter, req, &mut outcome).await;
    persist_state(state_store, req, cron_jobs).await?;

    Ok(outcome)
}

// ── (1) Workspace filesystem ──────────────────────────────────────────────────

fn apply_workspaces(
    fs: &impl WorkspaceFs,
    reporter: &impl ProgressReporter,
    req: &ExecuteRequest<'_>,
    outcome: &mut MigrationOutcome,
) -> Result<()> {
    for change in &req.plan.agents {
        match &change.kind {
            AgentChangeKind::Remove => {
                reporter.step(&format!("removing workspace for '{}'...", change.agent_id));
                remove_agent_paths(fs, req, change, outcome);
                outcome.agents_removed += 1;
            }
            AgentChangeKind::Add | AgentChangeKind::Update { .. } => {
                deploy_agent(fs, reporter, req, change, outcome)?;
                if matches!(change.kind, AgentChangeKind::Add) {
                    outcome.agents_added += 1;
                } else {
                    outcome.agents_updated += 1;
                }
            }
            AgentChangeKind::Unchanged => outcome.agents_unchanged += 1,
        }
    }
    Ok(())
}

/// Best-effort removal of everything an agent owns on disk. "Already
/// absent" is success; a path escaping the state root is a hard rejection,
/// surfaced as a warning and never deleted.
fn remove_agent_paths(
    fs: &impl WorkspaceFs,
    req: &ExecuteRequest<'_>,
    change: &AgentChange,
    outcome: &mut MigrationOutcome,
) {
    let workspace = req
        .previous
        .and_then(|state| state.agents.get(&change.slug))
        .map_or_else(
            || req.workspaces_root.join(&change.agent_id),
            |record| record.workspace.clone(),
        );
    let aux = req.agents_state_root.join(&change.agent_id);
    for path in [workspace, aux] {
        if let Err(err) = fs.remove_dir_within(req.home_root, &path) {
            outcome
                .warnings
                .push(format!("skipped removing {}: {err}", path.display()));
        }
    }
}

/// Deploy an agent's staged files, rewriting only those whose hash differs
/// from what the previous state recorded — unchanged files are never
/// rewritten. Files recorded previously but no longer staged are removed.
fn deploy_agent(
    fs: &impl WorkspaceFs,
    reporter: &impl ProgressReporter,
    req: &ExecuteRequest<'_>,
    change: &AgentChange,
    outcome: &mut MigrationOutcome,
) -> Result<()> {
    let workspace = req.workspaces_root.join(&change.agent_id);
    fs.create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;

    let recorded = req
        .previous
        .map(|state| state.file_hashes_for(&change.agent_id))
        .unwrap_or_default();

    let mut written = 0usize;
    let mut staged_keys: BTreeSet<String> = BTreeSet::new();
    for file in req.staged.files_for(&change.agent_id) {
        let key = file_hash_key(&change.agent_id, &file.rel_path);
        staged_keys.insert(key.clone());
        if recorded.get(&key) == Some(&file.hash) {
            continue;
        }
        let dest = workspace.join(&file.rel_path);
        if let Some(parent) = dest.parent() {
            fs.create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        fs.write(&dest, &file.bytes)
            .with_context(|| format!("writing {}", dest.display()))?;
        written += 1;
    }

    // Files the previous install deployed that are no longer desired.
    let prefix = format!("{}:", change.agent_id);
    for key in recorded.keys() {
        if !staged_keys.contains(key) {
            let rel = &key[prefix.len()..];
            let stale = workspace.join(rel);
            if let Err(err) = fs.remove_file_within(req.home_root, &stale) {
                outcome
                    .warnings
                    .push(format!("skipped removing {}: {err}", stale.display()));
            }
        }
    }

    reporter.step(&format!(
        "deployed '{}' ({written} file(s) written)",
        change.agent_id
    ));
    Ok(())
}

// ── (2) Host configuration document ───────────────────────────────────────────

/// Re-read the latest document, apply removals first, then additions, then
/// one idempotent topology recompute, and write the whole document back.
/// Removal-then-add ordering matters: a rename must not momentarily leave a
/// duplicate.
async fn apply_config(
    config_store: &impl HostConfigStore,
    reporter: &impl ProgressReporter,
    req: &ExecuteRequest<'_>,
    outcome: &mut MigrationOutcome,
) -> Result<()> {
    let mut config = config_store.load().await.context("re-reading host config")?;

    for change in &req.plan.agents {
        if matches!(change.kind, AgentChangeKind::Remove) {
            patcher::remove_agent_entry(&mut config, &change.agent_id);
        }
    }
    for change in &req.plan.bindings {
        if let BindingChange::Remove(binding) = change {
            patcher::remove_binding(&mut config, binding);
            outcome.bindings_removed += 1;
        }
    }

    for change in &req.plan.agents {
        match change.kind {
            AgentChangeKind::Add => {
                patcher::add_agent_entry(&mut config, agent_entry(req, change));
            }
            AgentChangeKind::Update { .. } => {
                patcher::update_agent_entry(&mut config, &agent_entry(req, change));
            }
            AgentChangeKind::Remove | AgentChangeKind::Unchanged => {}
        }
    }
    for change in &req.plan.bindings {
        if let BindingChange::Add(binding) = change {
            patcher::add_binding(&mut config, binding);
            outcome.bindings_added += 1;
        }
    }

    if !req.plan.topology.is_empty() {
        // One recompute with the full desired topology, not per-edge: the
        // allow-list ends up correct even if individual edge diffs were
        // imprecise.
        let edges = desired_topology_edges(req.manifest);
        patcher::recompute_agent_to_agent(&mut config, req.namespace, &edges);
        outcome.topology_changes = req.plan.topology.len();
    }

    config_store.save(&config).await.context("writing host config")?;
    reporter.step("host configuration updated");
    Ok(())
}

fn agent_entry(req: &ExecuteRequest<'_>, change: &AgentChange) -> AgentEntry {
    let def = req.manifest.agents.get(&change.slug);
    AgentEntry {
        id: change.agent_id.clone(),
        name: def
            .and_then(|d| d.display_name.clone())
            .or_else(|| Some(change.slug.clone())),
        workspace: Some(
            req.workspaces_root
                .join(&change.agent_id)
                .to_string_lossy()
                .into_owned(),
        ),
        model: def.and_then(|d| d.model.clone()),
        tools: def
            .and_then(|d| d.tools.as_ref())
            .and_then(|t| serde_json::to_value(t).ok()),
        rest: serde_json::Map::new(),
    }
}

// ── (3) Remote scheduler ──────────────────────────────────────────────────────

/// Reconcile the scheduler one job at a time. A remote error on an
/// individual job does not abort the remaining jobs or the migration: it is
/// surfaced as a warning, and local state reflects only the jobs that
/// actually succeeded remotely.
async fn apply_scheduler<S: SchedulerClient>(
    scheduler: Option<&S>,
    reporter: &impl ProgressReporter,
    req: &ExecuteRequest<'_>,
    outcome: &mut MigrationOutcome,
) -> Vec<CronJobRecord> {
    let mut jobs: Vec<CronJobRecord> = req
        .previous
        .map(|state| state.cron_jobs.clone())
        .unwrap_or_default();

    for change in &req.plan.cron_jobs {
        match change {
            CronJobChange::Remove { name, job_id } => match scheduler {
                None => outcome
                    .warnings
                    .push(format!("scheduler unavailable: job '{name}' not removed")),
                Some(client) => match client.remove_job(job_id).await {
                    Ok(()) => {
                        jobs.retain(|job| &job.name != name);
                        outcome.jobs_removed += 1;
                    }
                    Err(err) if err.is_not_found() => {
                        // Already gone remotely — removal is idempotent.
                        jobs.retain(|job| &job.name != name);
                        outcome.jobs_removed += 1;
                    }
                    Err(err) => outcome.warnings.push(format!("job '{name}': {err}")),
                },
            },
            CronJobChange::Add { name, spec } => match scheduler {
                None => outcome
                    .warnings
                    .push(format!("scheduler unavailable: job '{name}' not created")),
                Some(client) => {
                    let params = job_params(req, name, spec);
                    match client.add_job(&params).await {
                        Ok(id) => {
                            jobs.push(CronJobRecord {
                                id,
                                name: name.clone(),
                                agent_slug: spec.agent_slug.clone(),
                                schedule: spec.schedule.clone(),
                                prompt: spec.prompt.clone(),
                                timezone: spec.timezone.clone(),
                            });
                            outcome.jobs_added += 1;
                        }
                        Err(err) => outcome.warnings.push(format!("job '{name}': {err}")),
                    }
                }
            },
            CronJobChange::Update {
                name,
                job_id,
                new,
                ..
            } => match scheduler {
                None => outcome
                    .warnings
                    .push(format!("scheduler unavailable: job '{name}' not updated")),
                Some(client) => {
                    let params = job_params(req, name, new);
                    match client.update_job(job_id, &params).await {
                        Ok(()) => {
                            if let Some(job) = jobs.iter_mut().find(|job| &job.name == name) {
                                job.schedule = new.schedule.clone();
                                job.prompt = new.prompt.clone();
                                job.timezone = new.timezone.clone();
                            }
                            outcome.jobs_updated += 1;
                        }
                        Err(err) => outcome.warnings.push(format!("job '{name}': {err}")),
                    }
                }
            },
        }
    }

    if !req.plan.cron_jobs.is_empty() {
        reporter.step(&format!(
            "scheduler reconciled ({} change(s))",
            req.plan.cron_jobs.len()
        ));
    }
    jobs
}

fn job_params(req: &ExecuteRequest<'_>, name: &str, spec: &CronJobSpec) -> CronJobParams {
    CronJobParams {
        name: name.to_string(),
        agent_id: req
            .agent_ids
            .get(&spec.agent_slug)
            .cloned()
            .unwrap_or_else(|| format!("{}-{}", req.namespace, spec.agent_slug)),
        schedule: spec.schedule.clone(),
        prompt: spec.prompt.clone(),
        timezone: spec.timezone.clone(),
    }
}

// ── (4) Formation state ───────────────────────────────────────────────────────

async fn persist_state(
    state_store: &impl FormationStateStore,
    req: &ExecuteRequest<'_>,
    cron_jobs: Vec<CronJobRecord>,
) -> Result<()> {
    let now = Utc::now();

    let mut agents = BTreeMap::new();
    for (slug, def) in &req.manifest.agents {
        let Some(agent_id) = req.agent_ids.get(slug) else {
            continue;
        };
        let files: Vec<String> = req
            .staged
            .files_for(agent_id)
            .map(|file| file.rel_path.clone())
            .collect();
        agents.insert(
            slug.clone(),
            AgentRecord {
                id: agent_id.clone(),
                workspace: req.workspaces_root.join(agent_id),
                files,
                model: def.model.clone(),
            },
        );
    }

    let mut bindings: Vec<Binding> = req
        .previous
        .map(|state| state.bindings.clone())
        .unwrap_or_default();
    for change in &req.plan.bindings {
        match change {
            BindingChange::Remove(binding) => {
                bindings.retain(|b| !patcher::bindings_equal(b, binding));
            }
            BindingChange::Add(binding) => {
                if !bindings.iter().any(|b| patcher::bindings_equal(b, binding)) {
                    bindings.push(binding.clone());
                }
            }
        }
    }

    let state = FormationState {
        namespace: req.namespace.to_string(),
        name: req.name.to_string(),
        version: req.manifest.version.clone(),
        installed_at: req.previous.map_or(now, |state| state.installed_at),
        updated_at: now,
        agents,
        bindings,
        cron_jobs,
        variables: req.persisted_variables.clone(),
        file_hashes: req.staged.file_hashes.clone(),
        agent_to_agent_edges: Some(desired_topology_edges(req.manifest)),
        source_path: req.source_snapshot.clone(),
    };

    state_store.save(&state).await.context("persisting formation state")
}
