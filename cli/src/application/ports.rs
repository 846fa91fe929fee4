//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `aviary_common` — never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use aviary_common::HostConfig;
use serde::{Deserialize, Serialize};

use crate::domain::error::SchedulerError;
use crate::domain::state::FormationState;

// ── Host configuration ────────────────────────────────────────────────────────

/// Whole-document access to the host configuration. The document is always
/// read-modify-written as a whole; implementations must preserve a backup of
/// the pre-mutation document on every save.
#[allow(async_fn_in_trait)]
pub trait HostConfigStore {
    /// Read the latest document, coercing a missing file to the default.
    async fn load(&self) -> Result<HostConfig>;
    /// Persist the whole document (backup, then atomic replace).
    async fn save(&self, config: &HostConfig) -> Result<()>;
}

// ── Formation state ───────────────────────────────────────────────────────────

/// Persistence of formation state records, one per `(namespace, name)`.
#[allow(async_fn_in_trait)]
pub trait FormationStateStore {
    /// Load a record, returning `None` if the formation is not installed.
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<FormationState>>;
    /// Persist a record.
    async fn save(&self, state: &FormationState) -> Result<()>;
    /// Remove a record. Already-absent is success.
    async fn remove(&self, namespace: &str, name: &str) -> Result<()>;
    /// All installed records.
    async fn list(&self) -> Result<Vec<FormationState>>;
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Parameters for creating or patching a remote scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobParams {
    pub name: String,
    pub agent_id: String,
    pub schedule: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A job as reported by the remote scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJob {
    pub id: String,
    pub name: String,
    pub schedule: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Job CRUD against the remote scheduler. Every call returns an explicit
/// `Result` — the caller makes the log-and-continue decision; nothing is
/// swallowed here.
#[allow(async_fn_in_trait)]
pub trait SchedulerClient {
    async fn add_job(&self, params: &CronJobParams) -> Result<String, SchedulerError>;
    async fn update_job(&self, id: &str, patch: &CronJobParams) -> Result<(), SchedulerError>;
    async fn remove_job(&self, id: &str) -> Result<(), SchedulerError>;
    async fn list_jobs(&self) -> Result<Vec<RemoteJob>, SchedulerError>;
}

// ── Workspace filesystem ──────────────────────────────────────────────────────

/// Filesystem operations the migration machinery needs. Sync trait — the
/// services run it through `spawn_blocking` indirectly via the async
/// command layer; trees involved are small.
pub trait WorkspaceFs {
    fn exists(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
    /// Content hash of a file, `None` if the file does not exist.
    fn hash_file(&self, path: &Path) -> Result<Option<String>>;
    /// Recursive listing of regular files under `root`, as sorted relative
    /// paths. An absent root yields an empty listing.
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;
    /// Recursively copy a directory tree.
    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()>;
    /// Remove a file, but only if it resolves under `root`. Already-absent
    /// is success; an escaping path is a hard error, never a silent skip.
    fn remove_file_within(&self, root: &Path, path: &Path) -> Result<()>;
    /// Remove a directory tree, with the same containment guard.
    fn remove_dir_within(&self, root: &Path, path: &Path) -> Result<()>;
}

// ── Progress reporting ────────────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Interactive prompting ─────────────────────────────────────────────────────

/// Abstracts the interactive prompt UI (out of scope itself) so services
/// can resolve missing values and per-item confirmations without a TTY
/// dependency.
pub trait ValuePrompter {
    /// Prompt for a plain value.
    fn input(&self, key: &str, description: Option<&str>, default: Option<&str>) -> Result<String>;
    /// Prompt for a sensitive value (no echo).
    fn secret(&self, key: &str, description: Option<&str>) -> Result<String>;
    /// Yes/no confirmation with a default.
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;
}
