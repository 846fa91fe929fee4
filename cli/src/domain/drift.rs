//! Drift finding types — the vocabulary of the repair scan. No I/O.
//!
//! Drift is classified, never auto-fixed without explicit instruction.

use serde::Serialize;

/// Which backing store a finding concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DriftDomain {
    ConfigAgent,
    ConfigBinding,
    WorkspaceFile,
    CronJob,
    Topology,
}

/// How recorded state and the live world disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DriftKind {
    /// Recorded but absent from the live store.
    Missing,
    /// Present in the live store but not recorded.
    Orphaned,
    /// Present in both, content differs.
    Changed,
}

/// Whether a finding can be corrected from recorded state alone, or needs
/// the original formation source tree (state cannot regenerate file
/// content).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DriftFix {
    Fixable,
    NeedsSource,
}

/// One discrepancy between recorded state and the live world.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftFinding {
    pub domain: DriftDomain,
    pub kind: DriftKind,
    pub fix: DriftFix,
    /// What drifted: an agent id, a binding description, a file-hash key,
    /// or a job name.
    pub subject: String,
    pub detail: String,
}

impl DriftFinding {
    #[must_use]
    pub fn new(
        domain: DriftDomain,
        kind: DriftKind,
        fix: DriftFix,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            kind,
            fix,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}
