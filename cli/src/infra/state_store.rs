//! Infrastructure implementation of the `FormationStateStore` port.
//!
//! One JSON file per installed formation under the formations directory,
//! with atomic write (temp file + rename) to prevent state corruption, plus
//! content-addressed source snapshots for later export and repair.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::{FormationStateStore, WorkspaceFs};
use crate::domain::identity::state_file_name;
use crate::domain::state::FormationState;
use crate::infra::fs::LocalFs;

/// State file manager — implements `FormationStateStore` for the infra
/// layer.
#[derive(Clone)]
pub struct StateManager {
    formations_dir: PathBuf,
    sources_dir: PathBuf,
}

impl StateManager {
    /// Create a state manager over the given directories.
    #[must_use]
    pub fn new(formations_dir: PathBuf, sources_dir: PathBuf) -> Self {
        Self {
            formations_dir,
            sources_dir,
        }
    }

    fn record_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.formations_dir.join(state_file_name(namespace, name))
    }

    /// Persist a content-addressed snapshot of the formation source tree.
    /// An existing snapshot with the same digest is reused untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be copied.
    pub fn snapshot_source(&self, source_root: &Path, digest: &str) -> Result<PathBuf> {
        let dest = self.sources_dir.join(digest);
        if !dest.exists() {
            LocalFs
                .copy_tree(source_root, &dest)
                .with_context(|| format!("snapshotting {}", source_root.display()))?;
        }
        Ok(dest)
    }

    /// Synchronous load — used internally by `load` via `spawn_blocking`.
    fn load_sync(&self, namespace: &str, name: &str) -> Result<Option<FormationState>> {
        let path = self.record_path(namespace, name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading state file {}", path.display()))?;
        let state: FormationState = serde_json::from_str(&content)
            .with_context(|| format!("parsing state file {}", path.display()))?;
        Ok(Some(state))
    }

    /// Synchronous save — used internally by `save` via `spawn_blocking`.
    fn save_sync(&self, state: &FormationState) -> Result<()> {
        let path = self.record_path(&state.namespace, &state.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(state).context("serializing state")?;

        // Atomic write via temp file then rename.
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("finalizing state file {}", path.display()))?;
        Ok(())
    }

    fn remove_sync(&self, namespace: &str, name: &str) -> Result<()> {
        let path = self.record_path(namespace, name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("removing state file {}", path.display()))?;
        }
        Ok(())
    }

    fn list_sync(&self) -> Result<Vec<FormationState>> {
        let mut states = Vec::new();
        if !self.formations_dir.exists() {
            return Ok(states);
        }
        for entry in std::fs::read_dir(&self.formations_dir)
            .with_context(|| format!("listing {}", self.formations_dir.display()))?
        {
            let path = entry
                .with_context(|| format!("listing {}", self.formations_dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading state file {}", path.display()))?;
            let state: FormationState = serde_json::from_str(&content)
                .with_context(|| format!("parsing state file {}", path.display()))?;
            states.push(state);
        }
        states.sort_by(|a, b| {
            (a.namespace.as_str(), a.name.as_str()).cmp(&(b.namespace.as_str(), b.name.as_str()))
        });
        Ok(states)
    }
}

impl FormationStateStore for StateManager {
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<FormationState>> {
        let mgr = self.clone();
        let namespace = namespace.to_string();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || mgr.load_sync(&namespace, &name))
            .await
            .context("state load task panicked")?
    }

    async fn save(&self, state: &FormationState) -> Result<()> {
        let mgr = self.clone();
        let state = state.clone();
        tokio::task::spawn_blocking(move || mgr.save_sync(&state))
            .await
            .context("state save task panicked")?
    }

    async fn remove(&self, namespace: &str, name: &str) -> Result<()> {
        let mgr = self.clone();
        let namespace = namespace.to_string();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || mgr.remove_sync(&namespace, &name))
            .await
            .context("state remove task panicked")?
    }

    async fn list(&self) -> Result<Vec<FormationState>> {
        let mgr = self.clone();
        tokio::task::spawn_blocking(move || mgr.list_sync())
            .await
            .context("state list task panicked")?
    }
}
