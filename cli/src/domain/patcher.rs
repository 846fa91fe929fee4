//! Config patcher — pure, idempotent edits over the host configuration
//! document. No I/O, no async.
//!
//! Every operation is a total function over well-formed documents; missing
//! containers are created, never rejected. Repeated application of the same
//! edit is a no-op, and edits never touch unrelated document regions.

use aviary_common::{
    AgentEntry, AgentToAgentConfig, Binding, HostConfig, DEFAULT_AGENT_ID,
};
use serde::Serialize;

use crate::domain::state::TopologyEdge;

// ── Canonical equality ────────────────────────────────────────────────────────

/// Canonical (key-sorted, recursively stable) JSON form of a value.
///
/// `serde_json::Value` maps are BTreeMap-backed, so converting to a `Value`
/// and serializing yields a field-order-independent form. Returns `None` if
/// the value cannot be represented as JSON.
#[must_use]
pub fn canonical_json<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value).ok().map(|v| v.to_string())
}

/// Structural equality over canonical JSON. Field-order differences never
/// cause false negatives; any field-value difference makes values unequal.
#[must_use]
pub fn bindings_equal(a: &Binding, b: &Binding) -> bool {
    match (canonical_json(a), canonical_json(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// ── Agent registry ────────────────────────────────────────────────────────────

/// Normalized form of an agent id: trimmed, lower-cased.
#[must_use]
pub fn normalize_agent_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Insert an agent entry, keyed by normalized id. No-op if an entry with the
/// same normalized id exists.
///
/// Seeding rule: if the list is currently empty and the new entry is not the
/// reserved default agent, a default-agent placeholder is inserted at
/// position 0 first, so "current default agent" semantics survive the
/// transition from empty to non-empty.
pub fn add_agent_entry(doc: &mut HostConfig, agent: AgentEntry) {
    let id = normalize_agent_id(&agent.id);
    if doc
        .agents
        .list
        .iter()
        .any(|entry| normalize_agent_id(&entry.id) == id)
    {
        return;
    }
    if doc.agents.list.is_empty() && id != DEFAULT_AGENT_ID {
        doc.agents.list.push(AgentEntry {
            id: DEFAULT_AGENT_ID.to_string(),
            ..AgentEntry::default()
        });
    }
    doc.agents.list.push(AgentEntry { id, ..agent });
}

/// Refresh the mutable fields of an existing entry in place, preserving its
/// position and any fields this tool does not manage. Inserts the entry if
/// it is absent.
pub fn update_agent_entry(doc: &mut HostConfig, agent: &AgentEntry) {
    let id = normalize_agent_id(&agent.id);
    if let Some(entry) = doc
        .agents
        .list
        .iter_mut()
        .find(|entry| normalize_agent_id(&entry.id) == id)
    {
        entry.name = agent.name.clone();
        entry.workspace = agent.workspace.clone();
        entry.model = agent.model.clone();
        entry.tools = agent.tools.clone();
    } else {
        add_agent_entry(doc, agent.clone());
    }
}

/// Remove an agent entry by exact id. No-op if absent.
pub fn remove_agent_entry(doc: &mut HostConfig, id: &str) {
    doc.agents.list.retain(|entry| entry.id != id);
}

// ── Bindings ──────────────────────────────────────────────────────────────────

/// Append a binding unless a structurally-equal one is already present.
pub fn add_binding(doc: &mut HostConfig, binding: &Binding) {
    if !doc.bindings.iter().any(|b| bindings_equal(b, binding)) {
        doc.bindings.push(binding.clone());
    }
}

/// Remove every binding structurally equal to `binding`. No-op if absent.
pub fn remove_binding(doc: &mut HostConfig, binding: &Binding) {
    doc.bindings.retain(|b| !bindings_equal(b, binding));
}

// ── Cross-agent messaging ─────────────────────────────────────────────────────

/// Allow-list pattern covering every agent of `namespace`.
#[must_use]
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{namespace}-*")
}

/// Enable cross-agent messaging for `namespace`: ensure the feature block
/// exists and carries the namespace's pattern.
pub fn set_agent_to_agent(doc: &mut HostConfig, namespace: &str) {
    let pattern = namespace_pattern(namespace);
    let block = doc.agent_to_agent.get_or_insert_with(AgentToAgentConfig::default);
    block.enabled = true;
    if !block.allow.contains(&pattern) {
        block.allow.push(pattern);
    }
    block.allow.sort();
    block.allow.dedup();
}

/// Withdraw `namespace` from cross-agent messaging.
///
/// If no other namespace still uses the feature, the block reverts to its
/// pre-formation condition: kept enabled (with an empty allow-list) when it
/// was enabled before this formation touched it, dropped entirely otherwise.
pub fn remove_agent_to_agent(
    doc: &mut HostConfig,
    namespace: &str,
    other_namespace_users_exist: bool,
    was_previously_enabled: bool,
) {
    let pattern = namespace_pattern(namespace);
    let Some(block) = doc.agent_to_agent.as_mut() else {
        return;
    };
    block.allow.retain(|entry| entry != &pattern);
    if block.allow.is_empty() && !other_namespace_users_exist {
        if was_previously_enabled {
            block.enabled = true;
        } else {
            doc.agent_to_agent = None;
        }
    }
}

/// Authoritative, idempotent form: given the full current topology for
/// `namespace`, derive whether its pattern belongs in the allow-list, union
/// with other namespaces' entries untouched, and sort deterministically.
pub fn recompute_agent_to_agent(doc: &mut HostConfig, namespace: &str, edges: &[TopologyEdge]) {
    let pattern = namespace_pattern(namespace);
    let mut allow: Vec<String> = doc
        .agent_to_agent
        .as_ref()
        .map(|block| {
            block
                .allow
                .iter()
                .filter(|entry| **entry != pattern)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if !edges.is_empty() {
        allow.push(pattern);
    }
    allow.sort();
    allow.dedup();

    if allow.is_empty() {
        doc.agent_to_agent = None;
    } else {
        doc.agent_to_agent = Some(AgentToAgentConfig { enabled: true, allow });
    }
}
