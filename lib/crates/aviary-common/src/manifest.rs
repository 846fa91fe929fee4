// lib/crates/aviary-common/src/manifest.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Formation manifest (`formation.yaml`).
///
/// The desired state of one formation: agents, channel bindings, scheduled
/// jobs, the agent-to-agent topology, and the variables the bundle consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormationManifest {
    pub namespace: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Agent slug -> definition. A `BTreeMap` keeps iteration deterministic.
    pub agents: BTreeMap<String, AgentDef>,
    #[serde(default)]
    pub bindings: Vec<BindingDef>,
    #[serde(rename = "cronJobs", default)]
    pub cron_jobs: Vec<CronJobDef>,
    /// Directed adjacency: source slug -> target slugs the agent may message.
    #[serde(default)]
    pub topology: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
}

/// One agent declared by a formation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    /// Directory of workspace files, relative to the formation root.
    pub source: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Option<ToolPolicy>,
}

/// Tool access policy for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// A channel binding declared by a formation: route matching traffic to the
/// named agent. Targets are slugs here; resolution to stable agent ids
/// happens at plan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingDef {
    pub agent: String,
    #[serde(rename = "match")]
    pub match_: BindingMatchDef,
}

/// Match descriptor of a declared binding. Fields other than `channel` may
/// contain `{{VAR}}` template tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingMatchDef {
    pub channel: String,
    #[serde(default)]
    pub peer: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

/// A scheduled job declared by a formation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobDef {
    pub agent: String,
    pub schedule: String,
    pub prompt: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A variable the formation's files and bindings may reference as `{{KEY}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    pub key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
