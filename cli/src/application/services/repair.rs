//! Application service — state-vs-world drift reconciliation.
//!
//! Repair is a sibling of update: it compares recorded state against the
//! live config document, the live filesystem content hashes, and the live
//! scheduler job list. Every discrepancy is classified `missing`/
//! `orphaned`/`changed` and tagged `fixable` (correctable from recorded
//! state alone) or `needsSource` (requires the original formation source
//! tree). Nothing is fixed without explicit instruction.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use aviary_common::DEFAULT_AGENT_ID;
use serde::Serialize;

use crate::application::ports::{
    CronJobParams, FormationStateStore, HostConfigStore, ProgressReporter, SchedulerClient,
    WorkspaceFs,
};
use crate::application::services::stage::StagedTree;
use crate::domain::drift::{DriftDomain, DriftFinding, DriftFix, DriftKind};
use crate::domain::patcher;
use crate::domain::state::{split_file_hash_key, FormationState, TopologyEdge};
use crate::domain::template;

/// Result of a drift scan.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub findings: Vec<DriftFinding>,
    /// Stores that could not be assessed (e.g. scheduler unreachable).
    pub warnings: Vec<String>,
}

/// Result of applying fixes.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub fixed: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

// ── Scan ──────────────────────────────────────────────────────────────────────

/// Compare recorded state against the live world. Pure inspection: no store
/// is mutated.
///
/// `foreign_agent_ids` are ids owned by other installed formations, so an
/// entry belonging to a sibling is never misread as an orphan.
///
/// # Errors
///
/// Returns an error if the config document or a workspace cannot be read.
pub async fn scan_drift<S: SchedulerClient>(
    config_store: &impl HostConfigStore,
    scheduler: Option<&S>,
    fs: &impl WorkspaceFs,
    state: &FormationState,
    foreign_agent_ids: &BTreeSet<String>,
) -> Result<DriftReport> {
    let mut report = DriftReport::default();

    scan_config(config_store, state, foreign_agent_ids, &mut report).await?;
    scan_workspaces(fs, state, &mut report)?;
    scan_scheduler(scheduler, state, &mut report).await;

    Ok(report)
}

async fn scan_config(
    config_store: &impl HostConfigStore,
    state: &FormationState,
    foreign_agent_ids: &BTreeSet<String>,
    report: &mut DriftReport,
) -> Result<()> {
    let config = config_store.load().await.context("reading host config")?;
    let recorded_ids: BTreeSet<String> = state.agent_ids().into_iter().collect();
    let live_ids: BTreeSet<String> = config
        .agents
        .list
        .iter()
        .map(|entry| patcher::normalize_agent_id(&entry.id))
        .collect();

    for id in &recorded_ids {
        if !live_ids.contains(id) {
            report.findings.push(DriftFinding::new(
                DriftDomain::ConfigAgent,
                DriftKind::Missing,
                DriftFix::Fixable,
                id.clone(),
                "agent entry dropped from host config",
            ));
        }
    }

    let namespace_prefix = format!("{}-", state.namespace);
    for id in &live_ids {
        if id.starts_with(&namespace_prefix)
            && !recorded_ids.contains(id)
            && !foreign_agent_ids.contains(id)
            && id.as_str() != DEFAULT_AGENT_ID
        {
            report.findings.push(DriftFinding::new(
                DriftDomain::ConfigAgent,
                DriftKind::Orphaned,
                DriftFix::Fixable,
                id.clone(),
                "agent entry in host config is not recorded by any formation",
            ));
        }
    }

    for binding in &state.bindings {
        if !config.bindings.iter().any(|b| patcher::bindings_equal(b, binding)) {
            report.findings.push(DriftFinding::new(
                DriftDomain::ConfigBinding,
                DriftKind::Missing,
                DriftFix::Fixable,
                describe_binding(binding),
                "binding dropped from host config",
            ));
        }
    }
    for binding in &config.bindings {
        if recorded_ids.contains(&binding.agent_id)
            && !state.bindings.iter().any(|b| patcher::bindings_equal(b, binding))
        {
            report.findings.push(DriftFinding::new(
                DriftDomain::ConfigBinding,
                DriftKind::Orphaned,
                DriftFix::Fixable,
                describe_binding(binding),
                "binding targets this formation but is not recorded",
            ));
        }
    }

    // Topology: only assessable when the record tracks edges.
    if let Some(edges) = &state.agent_to_agent_edges {
        let pattern = patcher::namespace_pattern(&state.namespace);
        let pattern_present = config
            .agent_to_agent
            .as_ref()
            .is_some_and(|block| block.allow.contains(&pattern));
        if !edges.is_empty() && !pattern_present {
            report.findings.push(DriftFinding::new(
                DriftDomain::Topology,
                DriftKind::Missing,
                DriftFix::Fixable,
                pattern.clone(),
                "cross-agent allow pattern dropped from host config",
            ));
        }
        if edges.is_empty() && pattern_present {
            report.findings.push(DriftFinding::new(
                DriftDomain::Topology,
                DriftKind::Orphaned,
                DriftFix::Fixable,
                pattern,
                "cross-agent allow pattern present without recorded edges",
            ));
        }
    }

    Ok(())
}

fn scan_workspaces(
    fs: &impl WorkspaceFs,
    state: &FormationState,
    report: &mut DriftReport,
) -> Result<()> {
    let workspace_by_id: BTreeMap<&str, &Path> = state
        .agents
        .values()
        .map(|record| (record.id.as_str(), record.workspace.as_path()))
        .collect();

    for (key, recorded_hash) in &state.file_hashes {
        let Some((agent_id, rel)) = split_file_hash_key(key) else {
            continue;
        };
        let Some(workspace) = workspace_by_id.get(agent_id) else {
            continue;
        };
        let path = workspace.join(rel);
        match fs.hash_file(&path)? {
            // Content cannot be regenerated from config/state alone.
            None => report.findings.push(DriftFinding::new(
                DriftDomain::WorkspaceFile,
                DriftKind::Missing,
                DriftFix::NeedsSource,
                key.clone(),
                "deployed file is missing from the workspace",
            )),
            Some(live_hash) if &live_hash != recorded_hash => {
                report.findings.push(DriftFinding::new(
                    DriftDomain::WorkspaceFile,
                    DriftKind::Changed,
                    DriftFix::NeedsSource,
                    key.clone(),
                    "deployed file content differs from the recorded hash",
                ));
            }
            Some(_) => {}
        }
    }

    for record in state.agents.values() {
        for rel in fs.list_files(&record.workspace)? {
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            let key = crate::domain::state::file_hash_key(&record.id, &rel_str);
            if !state.file_hashes.contains_key(&key) {
                // Deleting an unrecorded file needs no source material.
                report.findings.push(DriftFinding::new(
                    DriftDomain::WorkspaceFile,
                    DriftKind::Orphaned,
                    DriftFix::Fixable,
                    key,
                    "workspace file is not part of the deployed set",
                ));
            }
        }
    }

    Ok(())
}

async fn scan_scheduler<S: SchedulerClient>(
    scheduler: Option<&S>,
    state: &FormationState,
    report: &mut DriftReport,
) {
    let Some(client) = scheduler else {
        report
            .warnings
            .push("scheduler unreachable — job drift not assessed".to_string());
        return;
    };
    let remote = match client.list_jobs().await {
        Ok(jobs) => jobs,
        Err(err) => {
            report
                .warnings
                .push(format!("scheduler job listing failed — job drift not assessed: {err}"));
            return;
        }
    };

    let remote_by_id: BTreeMap<&str, &crate::application::ports::RemoteJob> =
        remote.iter().map(|job| (job.id.as_str(), job)).collect();
    let recorded_ids: BTreeSet<&str> =
        state.cron_jobs.iter().map(|job| job.id.as_str()).collect();

    for record in &state.cron_jobs {
        match remote_by_id.get(record.id.as_str()) {
            None => report.findings.push(DriftFinding::new(
                DriftDomain::CronJob,
                DriftKind::Missing,
                DriftFix::Fixable,
                record.name.clone(),
                "scheduled job is gone from the remote scheduler",
            )),
            Some(job) => {
                if job.schedule != record.schedule
                    || job.prompt != record.prompt
                    || job.timezone != record.timezone
                {
                    report.findings.push(DriftFinding::new(
                        DriftDomain::CronJob,
                        DriftKind::Changed,
                        DriftFix::Fixable,
                        record.name.clone(),
                        "remote job payload differs from the recorded one",
                    ));
                }
            }
        }
    }

    let namespace_prefix = format!("{}-", state.namespace);
    for job in &remote {
        let owned_name = job.name.starts_with(&namespace_prefix) && job.name.contains("-job-");
        if owned_name && !recorded_ids.contains(job.id.as_str()) {
            report.findings.push(DriftFinding::new(
                DriftDomain::CronJob,
                DriftKind::Orphaned,
                DriftFix::Fixable,
                job.name.clone(),
                "remote job carries this formation's name but is not recorded",
            ));
        }
    }
}

fn describe_binding(binding: &aviary_common::Binding) -> String {
    match (&binding.match_.peer, &binding.match_.account) {
        (Some(peer), _) => format!("{}/{} -> {}", binding.match_.channel, peer, binding.agent_id),
        (None, Some(account)) => format!(
            "{}@{} -> {}",
            binding.match_.channel, account, binding.agent_id
        ),
        (None, None) => format!("{} -> {}", binding.match_.channel, binding.agent_id),
    }
}

// ── Fix ───────────────────────────────────────────────────────────────────────

/// Apply fixes for the given findings, in the executor's store order:
/// filesystem, config document, scheduler, then state. `staged` is the
/// re-staged source tree, required for `needsSource` findings; without it
/// those findings are skipped and counted.
///
/// # Errors
///
/// Returns an error if the config document or state record cannot be
/// written.
#[allow(clippy::too_many_lines)]
pub async fn apply_fixes<S: SchedulerClient>(
    config_store: &impl HostConfigStore,
    state_store: &impl FormationStateStore,
    scheduler: Option<&S>,
    fs: &impl WorkspaceFs,
    reporter: &impl ProgressReporter,
    state: &FormationState,
    findings: &[DriftFinding],
    staged: Option<&StagedTree>,
    home_root: &Path,
) -> Result<RepairOutcome> {
    let mut outcome = RepairOutcome::default();
    let mut state = state.clone();
    let mut state_dirty = false;

    // Filesystem first.
    for finding in findings
        .iter()
        .filter(|f| f.domain == DriftDomain::WorkspaceFile)
    {
        match finding.kind {
            DriftKind::Orphaned => {
                let Some((agent_id, rel)) = split_file_hash_key(&finding.subject) else {
                    continue;
                };
                let Some(record) = state.agents.values().find(|r| r.id == agent_id) else {
                    continue;
                };
                let path = record.workspace.join(rel);
                match fs.remove_file_within(home_root, &path) {
                    Ok(()) => {
                        reporter.step(&format!("removed orphaned file {}", finding.subject));
                        outcome.fixed += 1;
                    }
                    Err(err) => outcome
                        .warnings
                        .push(format!("{}: {err}", finding.subject)),
                }
            }
            DriftKind::Missing | DriftKind::Changed => {
                if restore_file(fs, &mut state, finding, staged, &mut outcome)? {
                    state_dirty = true;
                } else {
                    outcome.skipped += 1;
                }
            }
        }
    }

    // Config document: one read-modify-write.
    let config_findings: Vec<&DriftFinding> = findings
        .iter()
        .filter(|f| {
            matches!(
                f.domain,
                DriftDomain::ConfigAgent | DriftDomain::ConfigBinding | DriftDomain::Topology
            )
        })
        .collect();
    if !config_findings.is_empty() {
        let mut config = config_store.load().await.context("re-reading host config")?;
        for finding in config_findings {
            match (finding.domain, finding.kind) {
                (DriftDomain::ConfigAgent, DriftKind::Missing) => {
                    if let Some((slug, record)) = state
                        .agents
                        .iter()
                        .find(|(_, r)| r.id == finding.subject)
                    {
                        patcher::add_agent_entry(
                            &mut config,
                            aviary_common::AgentEntry {
                                id: record.id.clone(),
                                name: Some(slug.clone()),
                                workspace: Some(record.workspace.to_string_lossy().into_owned()),
                                model: record.model.clone(),
                                tools: None,
                                rest: serde_json::Map::new(),
                            },
                        );
                        outcome.fixed += 1;
                    }
                }
                (DriftDomain::ConfigAgent, DriftKind::Orphaned) => {
                    patcher::remove_agent_entry(&mut config, &finding.subject);
                    outcome.fixed += 1;
                }
                (DriftDomain::ConfigBinding, DriftKind::Missing) => {
                    if let Some(binding) = state
                        .bindings
                        .iter()
                        .find(|b| describe_binding(b) == finding.subject)
                    {
                        patcher::add_binding(&mut config, binding);
                        outcome.fixed += 1;
                    }
                }
                (DriftDomain::ConfigBinding, DriftKind::Orphaned) => {
                    let orphan = config
                        .bindings
                        .iter()
                        .find(|b| describe_binding(b) == finding.subject)
                        .cloned();
                    if let Some(binding) = orphan {
                        patcher::remove_binding(&mut config, &binding);
                        outcome.fixed += 1;
                    }
                }
                (DriftDomain::Topology, _) => {
                    let edges: Vec<TopologyEdge> =
                        state.agent_to_agent_edges.clone().unwrap_or_default();
                    patcher::recompute_agent_to_agent(&mut config, &state.namespace, &edges);
                    outcome.fixed += 1;
                }
                _ => {}
            }
        }
        config_store.save(&config).await.context("writing host config")?;
        reporter.step("host configuration repaired");
    }

    // Scheduler.
    for finding in findings.iter().filter(|f| f.domain == DriftDomain::CronJob) {
        let Some(client) = scheduler else {
            outcome.skipped += 1;
            continue;
        };
        match finding.kind {
            DriftKind::Missing => {
                let params = state
                    .cron_jobs
                    .iter()
                    .find(|job| job.name == finding.subject)
                    .map(|record| CronJobParams {
                        name: record.name.clone(),
                        agent_id: state
                            .agents
                            .get(&record.agent_slug)
                            .map_or_else(String::new, |r| r.id.clone()),
                        schedule: record.schedule.clone(),
                        prompt: record.prompt.clone(),
                        timezone: record.timezone.clone(),
                    });
                if let Some(params) = params {
                    match client.add_job(&params).await {
                        Ok(id) => {
                            if let Some(record) = state
                                .cron_jobs
                                .iter_mut()
                                .find(|job| job.name == finding.subject)
                            {
                                record.id = id;
                            }
                            state_dirty = true;
                            outcome.fixed += 1;
                        }
                        Err(err) => outcome
                            .warnings
                            .push(format!("job '{}': {err}", finding.subject)),
                    }
                }
            }
            DriftKind::Changed => {
                let record = state
                    .cron_jobs
                    .iter()
                    .find(|job| job.name == finding.subject);
                if let Some(record) = record {
                    let params = CronJobParams {
                        name: record.name.clone(),
                        agent_id: state
                            .agents
                            .get(&record.agent_slug)
                            .map_or_else(String::new, |r| r.id.clone()),
                        schedule: record.schedule.clone(),
                        prompt: record.prompt.clone(),
                        timezone: record.timezone.clone(),
                    };
                    match client.update_job(&record.id, &params).await {
                        Ok(()) => outcome.fixed += 1,
                        Err(err) => outcome
                            .warnings
                            .push(format!("job '{}': {err}", finding.subject)),
                    }
                }
            }
            DriftKind::Orphaned => {
                let orphan_id = match client.list_jobs().await {
                    Ok(jobs) => jobs
                        .into_iter()
                        .find(|job| job.name == finding.subject)
                        .map(|job| job.id),
                    Err(err) => {
                        outcome
                            .warnings
                            .push(format!("job '{}': {err}", finding.subject));
                        None
                    }
                };
                if let Some(id) = orphan_id {
                    match client.remove_job(&id).await {
                        Ok(()) => outcome.fixed += 1,
                        Err(err) if err.is_not_found() => outcome.fixed += 1,
                        Err(err) => outcome
                            .warnings
                            .push(format!("job '{}': {err}", finding.subject)),
                    }
                }
            }
        }
    }

    if state_dirty {
        state_store.save(&state).await.context("persisting repaired state")?;
    }
    Ok(outcome)
}

/// Restore one missing/changed file from the re-staged source. Returns
/// `true` if the file was restored and the recorded hash updated.
fn restore_file(
    fs: &impl WorkspaceFs,
    state: &mut FormationState,
    finding: &DriftFinding,
    staged: Option<&StagedTree>,
    outcome: &mut RepairOutcome,
) -> Result<bool> {
    let Some(staged) = staged else {
        return Ok(false);
    };
    let Some((agent_id, rel)) = split_file_hash_key(&finding.subject) else {
        return Ok(false);
    };
    let Some(file) = staged
        .files
        .iter()
        .find(|f| f.agent_id == agent_id && f.rel_path == rel)
    else {
        outcome
            .warnings
            .push(format!("{}: not present in the provided source", finding.subject));
        return Ok(false);
    };
    // A sensitive variable persisted as a placeholder cannot faithfully
    // re-render the file; restoring it would deploy the literal token.
    if !template::looks_binary(&file.bytes)
        && std::str::from_utf8(&file.bytes)
            .is_ok_and(template::has_unresolved_tokens)
    {
        outcome.warnings.push(format!(
            "{}: re-rendered content still contains unresolved tokens",
            finding.subject
        ));
        return Ok(false);
    }
    let Some(record) = state.agents.values().find(|r| r.id == agent_id) else {
        return Ok(false);
    };
    let dest = record.workspace.join(rel);
    if let Some(parent) = dest.parent() {
        fs.create_dir_all(parent)?;
    }
    fs.write(&dest, &file.bytes)
        .with_context(|| format!("restoring {}", dest.display()))?;
    state
        .file_hashes
        .insert(finding.subject.clone(), file.hash.clone());
    outcome.fixed += 1;
    Ok(true)
}
