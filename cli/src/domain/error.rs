//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, or `std::net`. All error types
//! implement `thiserror::Error` and convert to `anyhow::Error` via the `?`
//! operator.

use thiserror::Error;

// ── Formation errors ──────────────────────────────────────────────────────────

/// Errors related to formation identity and lifecycle.
#[derive(Debug, Error)]
pub enum FormationError {
    #[error("Formation '{namespace}/{name}' is not installed. Install it: aviary install <path>")]
    NotInstalled { namespace: String, name: String },

    #[error(
        "Formation '{namespace}/{name}' is already installed. \
         Re-run with --force to replace it, or use: aviary update <path>"
    )]
    AlreadyInstalled { namespace: String, name: String },

    #[error(
        "Agent id '{id}' collides with formation '{owner}'. \
         Choose a different namespace: aviary install <path> --namespace <ns>"
    )]
    AgentIdCollision { id: String, owner: String },

    #[error("Invalid formation reference '{0}': expected <namespace>/<name>")]
    InvalidRef(String),

    #[error("Invalid identifier '{0}': must match ^[a-z0-9]([a-z0-9-]{{0,61}}[a-z0-9])?$")]
    InvalidIdentifier(String),

    #[error("Formation manifest validation failed:\n{0}")]
    ValidationFailed(String),

    #[error("Missing required variables (pass --var KEY=VALUE):\n{0}")]
    MissingVariables(String),
}

// ── Scheduler errors ──────────────────────────────────────────────────────────

/// Errors from the remote job scheduler. Individually non-fatal to a
/// migration: the executor decides log-and-continue at each call site.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler unreachable: {0}")]
    Unreachable(String),

    #[error("scheduler call timed out: {0}")]
    Timeout(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("scheduler rejected the call: {0}")]
    Remote(String),

    #[error("scheduler protocol error: {0}")]
    Protocol(String),
}

impl SchedulerError {
    /// Removal of an already-absent job is success, not failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound(_))
    }
}

// ── Filesystem guard errors ───────────────────────────────────────────────────

/// Errors from the scoped-deletion path guard. Always a hard rejection,
/// never folded into a success.
#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("refusing to touch '{path}': escapes root '{root}'")]
    Escapes { root: String, path: String },

    #[error("refusing to touch '{0}': contains a parent-directory component")]
    ParentComponent(String),
}
