//! Binding classifier — pure assessment of candidate bindings against the
//! host's channel configuration. No I/O, no async.
//!
//! Silently wiring a binding for a channel the host never configured, or
//! silently redirecting all traffic on a channel, is a safety hazard: the
//! caller must either ask or default to the safe (excluded) choice.

use aviary_common::Binding;
use serde::Serialize;
use serde_json::Value;

/// Whether a binding's channel type is configured on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelStatus {
    /// The channel type has a live configuration block.
    Configured,
    /// The channel type is absent from the host's channel configuration.
    Unconfigured,
    /// The host's channel configuration is absent or malformed — cannot
    /// assess, treat as pass-through.
    Unknown,
}

/// A candidate binding with its assessment.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedBinding {
    pub binding: Binding,
    pub status: ChannelStatus,
    /// Bare bindings match all traffic on their channel type and shadow the
    /// default agent.
    pub bare: bool,
}

impl ClassifiedBinding {
    /// The default selection verdict for this binding (install/update
    /// policy; repair never re-selects).
    #[must_use]
    pub fn selected_by_default(&self, include_bare: bool) -> bool {
        if self.bare && !include_bare {
            return false;
        }
        !matches!(self.status, ChannelStatus::Unconfigured)
    }

    /// Short human-readable reason for the default verdict, used by the
    /// interactive prompt.
    #[must_use]
    pub fn describe(&self) -> String {
        let channel = &self.binding.match_.channel;
        let scope = match (&self.binding.match_.peer, &self.binding.match_.account) {
            (Some(peer), _) => format!("peer {peer}"),
            (None, Some(account)) => format!("account {account}"),
            (None, None) => "all traffic".to_string(),
        };
        let status = match self.status {
            ChannelStatus::Configured => "configured",
            ChannelStatus::Unconfigured => "not configured on this host",
            ChannelStatus::Unknown => "configuration unknown",
        };
        format!("{channel} ({scope}) -> {} [{status}]", self.binding.agent_id)
    }
}

/// Classify each candidate binding against the host's channel configuration
/// block. An absent block, or one that is not a JSON object, cannot be
/// assessed — every binding is `unknown`.
#[must_use]
pub fn classify(bindings: &[Binding], channels: Option<&Value>) -> Vec<ClassifiedBinding> {
    let channels = channels.and_then(Value::as_object);
    bindings
        .iter()
        .map(|binding| ClassifiedBinding {
            bare: binding.match_.is_bare(),
            status: channels.map_or(ChannelStatus::Unknown, |map| {
                match map.get(&binding.match_.channel) {
                    Some(Value::Null) | None => ChannelStatus::Unconfigured,
                    Some(_) => ChannelStatus::Configured,
                }
            }),
            binding: binding.clone(),
        })
        .collect()
}

/// Apply the default selection policy: keep `configured` and `unknown`,
/// drop `unconfigured`; drop bare bindings regardless of status unless
/// `include_bare` is set.
#[must_use]
pub fn default_selection(classified: &[ClassifiedBinding], include_bare: bool) -> Vec<Binding> {
    classified
        .iter()
        .filter(|c| c.selected_by_default(include_bare))
        .map(|c| c.binding.clone())
        .collect()
}
