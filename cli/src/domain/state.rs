//! Formation state record — what is durably installed, as last applied.
//!
//! One record per `(namespace, name)` pair. State is written only by the
//! migration executor, after the corresponding mutation has been applied to
//! its backing store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use aviary_common::Binding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted record of one installed formation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationState {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Slug -> deployed agent record.
    pub agents: BTreeMap<String, AgentRecord>,
    /// Deployed bindings. Targets carry the resolved agent id, never a slug.
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default)]
    pub cron_jobs: Vec<CronJobRecord>,
    /// Resolved non-sensitive variable values; sensitive values are stored
    /// as an opaque placeholder, never the secret.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// `"<agentId>:<relativePath>"` -> content hash of the deployed file.
    /// Keys are namespaced by resolved agent id because slugs are not
    /// stable across renames.
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    /// Topology snapshot as last applied. Absent on legacy records, which
    /// means "cannot diff, must reapply everything".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_to_agent_edges: Option<Vec<TopologyEdge>>,
    /// Persisted snapshot of the formation source tree, for export/repair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

/// One deployed agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Stable resolved id (`"<namespace>-<slug>"`).
    pub id: String,
    pub workspace: PathBuf,
    /// Relative paths of the deployed workspace files.
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// One deployed scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobRecord {
    /// Opaque id assigned by the remote scheduler.
    pub id: String,
    /// Deterministic logical name (stable across re-installs).
    pub name: String,
    pub agent_slug: String,
    pub schedule: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// One directed agent-to-agent edge, in formation-local slugs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
}

impl FormationState {
    /// File-hash keys belonging to the agent with resolved id `agent_id`.
    #[must_use]
    pub fn file_hashes_for(&self, agent_id: &str) -> BTreeMap<String, String> {
        let prefix = format!("{agent_id}:");
        self.file_hashes
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, hash)| (key.clone(), hash.clone()))
            .collect()
    }

    /// All resolved agent ids recorded by this formation.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.values().map(|record| record.id.clone()).collect()
    }
}

/// Build a file-hash key: `"<agentId>:<relativePath>"`.
#[must_use]
pub fn file_hash_key(agent_id: &str, rel_path: &str) -> String {
    format!("{agent_id}:{rel_path}")
}

/// Split a file-hash key back into `(agentId, relativePath)`.
#[must_use]
pub fn split_file_hash_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
}
