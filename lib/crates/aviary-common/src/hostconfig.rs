// lib/crates/aviary-common/src/hostconfig.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved id of the host's default agent. Bare bindings shadow it.
pub const DEFAULT_AGENT_ID: &str = "main";

/// The host configuration document (`aviary.json`).
///
/// Only the regions the formation machinery edits are typed; everything else
/// is carried in `rest` so a read-modify-write cycle never drops or corrupts
/// unrelated parts of the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub agents: AgentRegistry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    /// Channel configuration block, keyed by channel type. Kept opaque so a
    /// malformed block never fails the document parse; the binding
    /// classifier treats anything that is not an object as "cannot assess".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Value>,
    #[serde(rename = "agentToAgent", default, skip_serializing_if = "Option::is_none")]
    pub agent_to_agent: Option<AgentToAgentConfig>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// The host's agent registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRegistry {
    #[serde(default)]
    pub list: Vec<AgentEntry>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// One registered agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A deployed channel binding. The target is always a resolved agent id,
/// never a formation-local slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    #[serde(rename = "match")]
    pub match_: BindingMatch,
}

/// Match descriptor of a deployed binding. All template tokens are resolved
/// by the time a value of this type exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingMatch {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl BindingMatch {
    /// A bare match has no scoping field and therefore routes all traffic on
    /// its channel type, shadowing the default agent.
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.peer.is_none() && self.account.is_none()
    }
}

/// Cross-agent messaging feature block: an enable flag plus an allow-list of
/// `"<namespace>-*"` glob patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentToAgentConfig {
    pub enabled: bool,
    #[serde(default)]
    pub allow: Vec<String>,
}
