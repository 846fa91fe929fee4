//! Migration plan engine — pure diff of recorded state against a desired
//! manifest. No I/O; deterministic: the same inputs always produce the same
//! plan, which is what makes dry-run exact and re-runs idempotent.

use std::collections::{BTreeMap, BTreeSet};

use aviary_common::{Binding, BindingMatch, FormationManifest};
use serde::Serialize;

use crate::domain::patcher::canonical_json;
use crate::domain::state::{FormationState, TopologyEdge};
use crate::domain::{identity, template};

// ── Plan structure ────────────────────────────────────────────────────────────

/// How one agent moves from recorded to desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AgentChangeKind {
    Add,
    /// The set of `"<agentId>:<path>"` keys differs (or the model changed).
    /// Carries the relative paths that were added, removed, or re-hashed so
    /// execution can re-deploy exactly those files.
    Update { changed_paths: Vec<String> },
    Remove,
    Unchanged,
}

/// One agent's entry in the plan. Unlike cron jobs, unchanged agents are
/// listed explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct AgentChange {
    pub slug: String,
    pub agent_id: String,
    #[serde(flatten)]
    pub kind: AgentChangeKind,
}

/// A binding change. There is no update: a changed binding is a
/// remove-plus-add pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "binding")]
pub enum BindingChange {
    Add(Binding),
    Remove(Binding),
}

/// Desired payload of one scheduled job, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobSpec {
    pub agent_slug: String,
    pub schedule: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A scheduled-job change, keyed by deterministic logical name. Unchanged
/// jobs are not listed at all.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CronJobChange {
    Add {
        name: String,
        spec: CronJobSpec,
    },
    /// Carries both payloads so the executor can issue a single patch call.
    Update {
        name: String,
        job_id: String,
        old: CronJobSpec,
        new: CronJobSpec,
    },
    Remove {
        name: String,
        job_id: String,
    },
}

/// An agent-to-agent edge change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "edge")]
pub enum TopologyChange {
    Add(TopologyEdge),
    Remove(TopologyEdge),
    /// Previous state predates edge-tracking: cannot diff against nothing,
    /// so conservatively resend the edge.
    Reapply(TopologyEdge),
}

/// Informational version marker. Never forces any of the other diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub from: String,
    pub to: String,
}

/// The computed set of changes needed to reconcile recorded state with a
/// desired manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub agents: Vec<AgentChange>,
    pub bindings: Vec<BindingChange>,
    pub cron_jobs: Vec<CronJobChange>,
    pub topology: Vec<TopologyChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionChange>,
}

impl MigrationPlan {
    /// The idempotence gate: true iff every agent is unchanged, every other
    /// list is empty, and the version did not move. Running the planner
    /// twice against the same manifest with no intervening changes must
    /// yield an empty plan.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents
            .iter()
            .all(|change| matches!(change.kind, AgentChangeKind::Unchanged))
            && self.bindings.is_empty()
            && self.cron_jobs.is_empty()
            && self.topology.is_empty()
            && self.version.is_none()
    }

    /// Keep only the binding additions the caller selected (classifier
    /// verdicts plus any interactive overrides). Removals are never subject
    /// to selection.
    #[must_use]
    pub fn with_selected_bindings(mut self, selected: &[Binding]) -> Self {
        let keys: BTreeSet<Option<String>> =
            selected.iter().map(canonical_json).collect();
        self.bindings.retain(|change| match change {
            BindingChange::Add(binding) => keys.contains(&canonical_json(binding)),
            BindingChange::Remove(_) => true,
        });
        self
    }
}

// ── Desired-state resolution ──────────────────────────────────────────────────

/// Resolve the manifest's declared bindings: slug -> id, template
/// substitution, and the unresolved-token drop. A binding whose match still
/// carries a `{{TOKEN}}` after substitution (an optional variable the user
/// never set) is omitted entirely — it must never be wired with a literal
/// placeholder.
#[must_use]
pub fn resolve_bindings(
    manifest: &FormationManifest,
    agent_ids: &BTreeMap<String, String>,
    variables: &BTreeMap<String, String>,
) -> Vec<Binding> {
    let mut seen: BTreeSet<Option<String>> = BTreeSet::new();
    let mut resolved = Vec::new();
    for def in &manifest.bindings {
        let Some(agent_id) = agent_ids.get(&def.agent) else {
            continue;
        };
        let match_ = BindingMatch {
            channel: template::substitute(&def.match_.channel, variables),
            peer: def
                .match_
                .peer
                .as_deref()
                .map(|p| template::substitute(p, variables)),
            account: def
                .match_
                .account
                .as_deref()
                .map(|a| template::substitute(a, variables)),
        };
        let still_templated = template::has_unresolved_tokens(&match_.channel)
            || match_
                .peer
                .as_deref()
                .is_some_and(template::has_unresolved_tokens)
            || match_
                .account
                .as_deref()
                .is_some_and(template::has_unresolved_tokens);
        if still_templated {
            continue;
        }
        let binding = Binding {
            agent_id: agent_id.clone(),
            match_,
        };
        if seen.insert(canonical_json(&binding)) {
            resolved.push(binding);
        }
    }
    resolved
}

/// Desired scheduled jobs keyed by deterministic logical name, with prompts
/// resolved against the variable set.
#[must_use]
pub fn desired_cron_jobs(
    manifest: &FormationManifest,
    namespace: &str,
    variables: &BTreeMap<String, String>,
) -> Vec<(String, CronJobSpec)> {
    manifest
        .cron_jobs
        .iter()
        .enumerate()
        .map(|(index, job)| {
            (
                identity::cron_job_name(namespace, &job.agent, index),
                CronJobSpec {
                    agent_slug: job.agent.clone(),
                    schedule: job.schedule.clone(),
                    prompt: template::substitute(&job.prompt, variables),
                    timezone: job.timezone.clone(),
                },
            )
        })
        .collect()
}

/// The manifest's topology as a sorted, deduplicated edge set.
#[must_use]
pub fn desired_topology_edges(manifest: &FormationManifest) -> Vec<TopologyEdge> {
    let mut edges: Vec<TopologyEdge> = manifest
        .topology
        .iter()
        .flat_map(|(from, targets)| {
            targets.iter().map(|to| TopologyEdge {
                from: from.clone(),
                to: to.clone(),
            })
        })
        .collect();
    edges.sort();
    edges.dedup();
    edges
}

// ── The planner ───────────────────────────────────────────────────────────────

/// Compute the migration plan. `previous = None` signals a fresh install:
/// every agent, binding, and job is an addition.
#[must_use]
pub fn compute_plan(
    previous: Option<&FormationState>,
    manifest: &FormationManifest,
    namespace: &str,
    agent_ids: &BTreeMap<String, String>,
    new_file_hashes: &BTreeMap<String, String>,
    variables: &BTreeMap<String, String>,
) -> MigrationPlan {
    MigrationPlan {
        agents: diff_agents(previous, manifest, agent_ids, new_file_hashes),
        bindings: diff_bindings(previous, manifest, agent_ids, variables),
        cron_jobs: diff_cron_jobs(previous, manifest, namespace, variables),
        topology: diff_topology(previous, manifest),
        version: version_change(previous, manifest),
    }
}

fn diff_agents(
    previous: Option<&FormationState>,
    manifest: &FormationManifest,
    agent_ids: &BTreeMap<String, String>,
    new_file_hashes: &BTreeMap<String, String>,
) -> Vec<AgentChange> {
    let mut changes = Vec::new();

    for (slug, def) in &manifest.agents {
        let Some(agent_id) = agent_ids.get(slug) else {
            continue;
        };
        let kind = match previous.and_then(|state| state.agents.get(slug)) {
            None => AgentChangeKind::Add,
            Some(record) => {
                let old = previous
                    .map(|state| state.file_hashes_for(&record.id))
                    .unwrap_or_default();
                let prefix = format!("{agent_id}:");
                let new: BTreeMap<String, String> = new_file_hashes
                    .iter()
                    .filter(|(key, _)| key.starts_with(&prefix))
                    .map(|(key, hash)| (key.clone(), hash.clone()))
                    .collect();

                let mut changed: BTreeSet<String> = BTreeSet::new();
                for (key, hash) in &new {
                    if old.get(key) != Some(hash) {
                        changed.insert(key[prefix.len()..].to_string());
                    }
                }
                for key in old.keys() {
                    if !new.contains_key(key) {
                        changed.insert(key[prefix.len()..].to_string());
                    }
                }

                if !changed.is_empty() || record.model != def.model {
                    AgentChangeKind::Update {
                        changed_paths: changed.into_iter().collect(),
                    }
                } else {
                    AgentChangeKind::Unchanged
                }
            }
        };
        changes.push(AgentChange {
            slug: slug.clone(),
            agent_id: agent_id.clone(),
            kind,
        });
    }

    if let Some(state) = previous {
        for (slug, record) in &state.agents {
            if !manifest.agents.contains_key(slug) {
                changes.push(AgentChange {
                    slug: slug.clone(),
                    agent_id: record.id.clone(),
                    kind: AgentChangeKind::Remove,
                });
            }
        }
    }

    changes
}

fn diff_bindings(
    previous: Option<&FormationState>,
    manifest: &FormationManifest,
    agent_ids: &BTreeMap<String, String>,
    variables: &BTreeMap<String, String>,
) -> Vec<BindingChange> {
    let desired = resolve_bindings(manifest, agent_ids, variables);
    let recorded: &[Binding] = previous.map(|state| state.bindings.as_slice()).unwrap_or(&[]);

    let desired_keys: BTreeSet<Option<String>> = desired.iter().map(canonical_json).collect();
    let recorded_keys: BTreeSet<Option<String>> = recorded.iter().map(canonical_json).collect();

    let mut changes = Vec::new();
    for binding in recorded {
        if !desired_keys.contains(&canonical_json(binding)) {
            changes.push(BindingChange::Remove(binding.clone()));
        }
    }
    for binding in desired {
        if !recorded_keys.contains(&canonical_json(&binding)) {
            changes.push(BindingChange::Add(binding));
        }
    }
    changes
}

fn diff_cron_jobs(
    previous: Option<&FormationState>,
    manifest: &FormationManifest,
    namespace: &str,
    variables: &BTreeMap<String, String>,
) -> Vec<CronJobChange> {
    let desired = desired_cron_jobs(manifest, namespace, variables);
    let recorded: BTreeMap<&str, &crate::domain::state::CronJobRecord> = previous
        .map(|state| {
            state
                .cron_jobs
                .iter()
                .map(|record| (record.name.as_str(), record))
                .collect()
        })
        .unwrap_or_default();

    let mut changes = Vec::new();
    let mut desired_names: BTreeSet<&str> = BTreeSet::new();

    for (name, spec) in &desired {
        desired_names.insert(name.as_str());
        match recorded.get(name.as_str()) {
            None => changes.push(CronJobChange::Add {
                name: name.clone(),
                spec: spec.clone(),
            }),
            Some(record) => {
                let old = CronJobSpec {
                    agent_slug: record.agent_slug.clone(),
                    schedule: record.schedule.clone(),
                    prompt: record.prompt.clone(),
                    timezone: record.timezone.clone(),
                };
                // Unchanged jobs are omitted from the plan entirely.
                if old.schedule != spec.schedule
                    || old.prompt != spec.prompt
                    || old.timezone != spec.timezone
                {
                    changes.push(CronJobChange::Update {
                        name: name.clone(),
                        job_id: record.id.clone(),
                        old,
                        new: spec.clone(),
                    });
                }
            }
        }
    }

    for (name, record) in &recorded {
        if !desired_names.contains(name) {
            changes.push(CronJobChange::Remove {
                name: (*name).to_string(),
                job_id: record.id.clone(),
            });
        }
    }

    changes
}

fn diff_topology(previous: Option<&FormationState>, manifest: &FormationManifest) -> Vec<TopologyChange> {
    let desired = desired_topology_edges(manifest);
    match previous {
        None => desired.into_iter().map(TopologyChange::Add).collect(),
        Some(state) => match &state.agent_to_agent_edges {
            // Legacy record: cannot diff against nothing, reapply everything.
            None => desired.into_iter().map(TopologyChange::Reapply).collect(),
            Some(recorded) => {
                let recorded: BTreeSet<&TopologyEdge> = recorded.iter().collect();
                let desired_set: BTreeSet<TopologyEdge> = desired.iter().cloned().collect();
                let mut changes: Vec<TopologyChange> = Vec::new();
                for edge in &desired {
                    if !recorded.contains(edge) {
                        changes.push(TopologyChange::Add(edge.clone()));
                    }
                }
                for edge in recorded {
                    if !desired_set.contains(edge) {
                        changes.push(TopologyChange::Remove((*edge).clone()));
                    }
                }
                changes
            }
        },
    }
}

fn version_change(previous: Option<&FormationState>, manifest: &FormationManifest) -> Option<VersionChange> {
    let previous = previous?;
    if previous.version == manifest.version {
        None
    } else {
        Some(VersionChange {
            from: previous.version.clone(),
            to: manifest.version.clone(),
        })
    }
}
